//! Back-office commands.
//!
//! # Usage
//!
//! ```bash
//! # Orders awaiting confirmation
//! bazaar admin orders --status pending
//!
//! # Ship an order
//! bazaar admin set-status 41 shipped
//!
//! # Promote a user
//! bazaar admin set-role 7 --admin
//! ```

use std::io::Write;

use bazaar_core::{CategoryId, OrderId, OrderStatus, ProductId, UserId};
use bazaar_storefront::models::OrderListQuery;

use super::orders::{write_order, write_summaries};
use super::{CliError, Context};

/// Fail fast unless an admin is signed in.
///
/// # Errors
///
/// Returns `NotSignedIn` or `NotAdmin`.
pub fn require_admin(ctx: &Context) -> Result<(), CliError> {
    ctx.require_user()?;
    if ctx.storefront().session().can_administer() {
        Ok(())
    } else {
        Err(CliError::NotAdmin)
    }
}

pub async fn orders(ctx: &Context, status: Option<OrderStatus>) -> Result<(), CliError> {
    let query = OrderListQuery {
        status,
        ..OrderListQuery::default()
    };
    let orders = ctx.storefront().client().admin_orders(&query).await?;
    write_summaries(&mut std::io::stdout().lock(), &orders)?;
    Ok(())
}

pub async fn order(ctx: &Context, id: OrderId) -> Result<(), CliError> {
    let order = ctx.storefront().client().admin_order(id).await?;
    write_order(&mut std::io::stdout().lock(), &order)?;
    Ok(())
}

pub async fn set_status(ctx: &Context, id: OrderId, status: OrderStatus) -> Result<(), CliError> {
    ctx.storefront().client().set_order_status(id, status).await?;
    tracing::info!(order_id = %id, status = %status, "Order status updated");
    writeln!(std::io::stdout().lock(), "Order {id} is now {}", status.label())?;
    Ok(())
}

pub async fn stats(ctx: &Context) -> Result<(), CliError> {
    let stats = ctx.storefront().client().order_statistics().await?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "Orders:    {}", stats.total_orders)?;
    writeln!(out, "Pending:   {}", stats.pending_orders)?;
    writeln!(out, "Delivered: {}", stats.delivered_orders)?;
    writeln!(out, "Revenue:   {}", stats.total_revenue)?;
    Ok(())
}

pub async fn users(ctx: &Context) -> Result<(), CliError> {
    let users = ctx.storefront().client().users().await?;
    let mut out = std::io::stdout().lock();
    for user in users {
        let role = if user.is_admin { "admin" } else { "" };
        writeln!(
            out,
            "{:>5}  {:<20} {:<24} {:<32} {role}",
            user.id.to_string(),
            user.login,
            user.username,
            user.email
        )?;
    }
    Ok(())
}

pub async fn set_role(ctx: &Context, id: UserId, is_admin: bool) -> Result<(), CliError> {
    let user = ctx.storefront().client().set_user_role(id, is_admin).await?;
    tracing::info!(user_id = %id, is_admin, "User role updated");
    let role = if user.is_admin { "an administrator" } else { "a customer" };
    writeln!(std::io::stdout().lock(), "{} is now {role}", user.login)?;
    Ok(())
}

pub async fn delete_user(ctx: &Context, id: UserId) -> Result<(), CliError> {
    ctx.storefront().client().delete_user(id).await?;
    tracing::info!(user_id = %id, "User deleted");
    writeln!(std::io::stdout().lock(), "User {id} deleted")?;
    Ok(())
}

pub async fn create_category(ctx: &Context, name: &str) -> Result<(), CliError> {
    let category = ctx.storefront().client().create_category(name).await?;
    writeln!(
        std::io::stdout().lock(),
        "Category {} created (#{})",
        category.name,
        category.id
    )?;
    Ok(())
}

pub async fn rename_category(ctx: &Context, id: CategoryId, name: &str) -> Result<(), CliError> {
    let category = ctx.storefront().client().rename_category(id, name).await?;
    writeln!(
        std::io::stdout().lock(),
        "Category #{} renamed to {}",
        category.id,
        category.name
    )?;
    Ok(())
}

pub async fn delete_category(ctx: &Context, id: CategoryId) -> Result<(), CliError> {
    ctx.storefront().client().delete_category(id).await?;
    writeln!(std::io::stdout().lock(), "Category {id} deleted")?;
    Ok(())
}

pub async fn delete_product(ctx: &Context, id: ProductId) -> Result<(), CliError> {
    ctx.storefront().client().delete_product(id).await?;
    writeln!(std::io::stdout().lock(), "Product {id} deleted")?;
    Ok(())
}
