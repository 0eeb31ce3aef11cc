//! Cart and checkout commands.

use std::io::Write;

use bazaar_core::{CartLineId, DeliveryMethod, PaymentMethod, ProductId};
use bazaar_storefront::cart::CartLine;
use bazaar_storefront::checkout::CheckoutError;
use bazaar_storefront::models::DeliveryInfo;

use super::{CliError, Context};

pub fn show(ctx: &Context) -> Result<(), CliError> {
    ctx.require_user()?;
    let cart = ctx.storefront().cart();
    let mut out = std::io::stdout().lock();

    if cart.is_empty() {
        writeln!(out, "Your cart is empty")?;
        return Ok(());
    }

    for line in cart.lines() {
        write_line(&mut out, &line)?;
    }
    writeln!(out, "{} item(s), subtotal {}", cart.item_count(), cart.subtotal())?;
    Ok(())
}

pub async fn add(ctx: &Context, product_id: ProductId, quantity: u32) -> Result<(), CliError> {
    ctx.require_user()?;
    let line = ctx.storefront().cart().add(product_id, quantity).await?;
    writeln!(
        std::io::stdout().lock(),
        "{} x{} in cart",
        line.product.name,
        line.quantity
    )?;
    Ok(())
}

pub async fn increment(ctx: &Context, product_id: ProductId) -> Result<(), CliError> {
    ctx.require_user()?;
    let line = ctx.storefront().cart().increment(product_id).await?;
    let mut out = std::io::stdout().lock();
    match line {
        Some(line) => write_line(&mut out, &line)?,
        None => writeln!(out, "Product {product_id} is not in your cart")?,
    }
    Ok(())
}

pub async fn decrement(ctx: &Context, product_id: ProductId) -> Result<(), CliError> {
    ctx.require_user()?;
    let line = ctx.storefront().cart().decrement(product_id).await?;
    let mut out = std::io::stdout().lock();
    match line {
        Some(line) => write_line(&mut out, &line)?,
        None => writeln!(out, "Product {product_id} is not in your cart")?,
    }
    Ok(())
}

pub async fn remove(ctx: &Context, line_id: CartLineId) -> Result<(), CliError> {
    ctx.require_user()?;
    ctx.storefront().cart().remove(line_id).await?;
    writeln!(std::io::stdout().lock(), "Removed cart line {line_id}")?;
    Ok(())
}

pub async fn checkout(
    ctx: &Context,
    address: String,
    phone: String,
    delivery_method: DeliveryMethod,
    payment_method: PaymentMethod,
    notes: Option<String>,
) -> Result<(), CliError> {
    ctx.require_user()?;
    let info = DeliveryInfo {
        address,
        phone,
        delivery_method,
        payment_method,
        notes,
    };

    let result = ctx.storefront().checkout().checkout(&info).await;
    let mut out = std::io::stdout().lock();
    match result {
        Ok(order) => {
            writeln!(
                out,
                "Order {} placed: {} ({})",
                order.display_number(),
                order.total_price,
                order.status.label()
            )?;
            Ok(())
        }
        Err(CheckoutError::CartNotCleared {
            order,
            uncleared,
            source,
        }) => {
            // The purchase went through; only the cleanup did not.
            writeln!(
                out,
                "Order {} placed: {} ({})",
                order.display_number(),
                order.total_price,
                order.status.label()
            )?;
            tracing::warn!(
                uncleared = uncleared.len(),
                error = %source,
                "Some cart lines could not be cleared; run `bazaar cart show`"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn write_line(out: &mut impl Write, line: &CartLine) -> std::io::Result<()> {
    writeln!(
        out,
        "[{:>4}] {:<40} {} x {} = {}",
        line.id.to_string(),
        line.product.name,
        line.unit_price(),
        line.quantity,
        line.line_total()
    )
}
