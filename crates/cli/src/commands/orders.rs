//! Order history commands, shared with the admin views.

use std::io::Write;

use bazaar_core::OrderId;
use bazaar_storefront::models::{Order, OrderListQuery, OrderSummary};

use super::{CliError, Context};

pub async fn list(ctx: &Context) -> Result<(), CliError> {
    ctx.require_user()?;
    let orders = ctx
        .storefront()
        .client()
        .my_orders(&OrderListQuery::default())
        .await?;
    write_summaries(&mut std::io::stdout().lock(), &orders)?;
    Ok(())
}

pub async fn show(ctx: &Context, id: OrderId) -> Result<(), CliError> {
    ctx.require_user()?;
    let order = ctx.storefront().client().my_order(id).await?;
    write_order(&mut std::io::stdout().lock(), &order)?;
    Ok(())
}

pub fn write_summaries(out: &mut impl Write, orders: &[OrderSummary]) -> std::io::Result<()> {
    if orders.is_empty() {
        return writeln!(out, "No orders");
    }
    for order in orders {
        let number = order
            .order_number
            .clone()
            .unwrap_or_else(|| format!("#{}", order.id));
        writeln!(
            out,
            "{:<16} {}  {:<22} {}",
            number,
            order.created_at.format("%Y-%m-%d %H:%M"),
            order.status.label(),
            order.total_price
        )?;
    }
    Ok(())
}

pub fn write_order(out: &mut impl Write, order: &Order) -> std::io::Result<()> {
    writeln!(out, "Order {}", order.display_number())?;
    writeln!(out, "Placed:   {}", order.created_at.format("%Y-%m-%d %H:%M"))?;
    writeln!(out, "Status:   {}", order.status.label())?;
    writeln!(
        out,
        "Delivery: {} to {} ({})",
        order.delivery_method.label(),
        order.delivery_address,
        order.delivery_phone
    )?;
    writeln!(out, "Payment:  {}", order.payment_method.label())?;
    if let Some(notes) = &order.notes {
        writeln!(out, "Notes:    {notes}")?;
    }
    writeln!(out)?;
    for item in &order.items {
        let name = item
            .product_name
            .clone()
            .unwrap_or_else(|| format!("Product {}", item.product_id));
        writeln!(
            out,
            "  {:<40} {} x {} = {}",
            name,
            item.price,
            item.quantity,
            item.price.times(item.quantity)
        )?;
    }
    writeln!(out, "Total: {}", order.total_price)
}
