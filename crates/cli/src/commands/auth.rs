//! Account commands.

use std::io::Write;

use bazaar_core::Email;
use bazaar_storefront::models::NewUser;

use super::{CliError, Context, secret_or_prompt};

pub async fn login(ctx: &Context, login: &str, password: Option<String>) -> Result<(), CliError> {
    let password = secret_or_prompt(password, "Password")?;
    let user = ctx.storefront().sign_in(login, &password).await?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "Signed in as {} ({})", user.username, user.login)?;
    let count = ctx.storefront().cart().item_count();
    if count > 0 {
        writeln!(out, "Your cart has {count} item(s)")?;
    }
    Ok(())
}

pub async fn register(
    ctx: &Context,
    login: String,
    username: String,
    email: &str,
    password: Option<String>,
) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let password = secret_or_prompt(password, "Password")?;

    let user = ctx
        .storefront()
        .register(NewUser {
            login,
            username,
            email,
            password,
        })
        .await?;

    writeln!(
        std::io::stdout().lock(),
        "Welcome, {}! Your account {} is ready.",
        user.username,
        user.login
    )?;
    Ok(())
}

pub async fn logout(ctx: &Context) -> Result<(), CliError> {
    ctx.storefront().sign_out().await;
    writeln!(std::io::stdout().lock(), "Signed out")?;
    Ok(())
}

pub fn whoami(ctx: &Context) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    match ctx.storefront().session().user() {
        Some(user) => {
            writeln!(out, "{} ({})", user.username, user.login)?;
            writeln!(out, "Email: {}", user.email)?;
            if user.is_admin {
                writeln!(out, "Role:  administrator")?;
            }
        }
        None => writeln!(out, "Not signed in")?,
    }
    Ok(())
}

pub async fn change_username(ctx: &Context, new_username: &str) -> Result<(), CliError> {
    ctx.require_user()?;
    let user = ctx
        .storefront()
        .session()
        .change_username(new_username)
        .await?;
    writeln!(std::io::stdout().lock(), "Display name is now {}", user.username)?;
    Ok(())
}

pub async fn change_password(ctx: &Context) -> Result<(), CliError> {
    ctx.require_user()?;
    let current = secret_or_prompt(None, "Current password")?;
    let new = secret_or_prompt(None, "New password")?;
    ctx.storefront()
        .session()
        .change_password(&current, &new)
        .await?;
    writeln!(std::io::stdout().lock(), "Password changed")?;
    Ok(())
}
