//! Catalog browsing commands.

use std::io::Write;

use bazaar_core::{CategoryId, ProductId};
use bazaar_storefront::models::ProductQuery;

use super::{CliError, Context};

pub async fn products(
    ctx: &Context,
    category_id: Option<CategoryId>,
    search: Option<String>,
    skip: Option<u32>,
    limit: Option<u32>,
) -> Result<(), CliError> {
    let query = ProductQuery {
        category_id,
        search,
        skip,
        limit,
    };
    let products = ctx.storefront().client().list_products(&query).await?;

    let mut out = std::io::stdout().lock();
    if products.is_empty() {
        writeln!(out, "No products found")?;
        return Ok(());
    }
    for product in products {
        let stock = if product.in_stock() {
            format!("{} in stock", product.stock)
        } else {
            "out of stock".to_string()
        };
        writeln!(
            out,
            "{:>5}  {:<40} {:>14}  {stock}",
            product.id.to_string(),
            product.name,
            product.price.to_string()
        )?;
    }
    Ok(())
}

pub async fn product(ctx: &Context, id: ProductId) -> Result<(), CliError> {
    let client = ctx.storefront().client();
    let product = client.product(id).await?;
    let specs = client.product_specs(id).await?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "{} (#{})", product.name, product.id)?;
    writeln!(out, "Price: {}", product.price)?;
    writeln!(out, "Stock: {}", product.stock)?;
    if !product.description.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", product.description)?;
    }
    if !specs.is_empty() {
        writeln!(out)?;
        for spec in specs {
            writeln!(out, "  {:<24} {}", spec.spec_name, spec.spec_value)?;
        }
    }
    if let Some(line) = ctx.storefront().cart().line_for(id) {
        writeln!(out)?;
        writeln!(out, "In your cart: {}", line.quantity)?;
    }
    Ok(())
}

pub async fn categories(ctx: &Context) -> Result<(), CliError> {
    let categories = ctx.storefront().client().categories().await?;
    let mut out = std::io::stdout().lock();
    for category in categories {
        writeln!(out, "{:>5}  {}", category.id.to_string(), category.name)?;
    }
    Ok(())
}
