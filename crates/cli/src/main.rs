//! Bazaar CLI - shop and run the back office from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept in .bazaar-session.json)
//! bazaar login ivan
//!
//! # Browse and fill the cart
//! bazaar products --search tea
//! bazaar cart add 12 --quantity 2
//! bazaar cart show
//!
//! # Place the order
//! bazaar checkout --address "Lenina 1" --phone "+7 900 000 00 00" --delivery pickup
//!
//! # Back office
//! bazaar admin orders --status pending
//! bazaar admin set-status 41 shipped
//! ```
//!
//! # Environment Variables
//!
//! - `BAZAAR_API_URL` - Backend base URL
//! - `BAZAAR_SESSION_FILE` - Where the access token is kept
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `RUST_LOG` - Log filter

#![cfg_attr(not(test), forbid(unsafe_code))]

use bazaar_core::{CartLineId, CategoryId, DeliveryMethod, OrderId, OrderStatus, PaymentMethod, ProductId, UserId};
use bazaar_storefront::StorefrontConfig;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod session_file;

use commands::CliError;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with login and password
    Login {
        login: String,
        /// Password (prompted on stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        login: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        /// Password (prompted on stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Update your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// List products
    Products {
        #[arg(short, long)]
        category: Option<CategoryId>,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one product with its characteristics
    Product { id: ProductId },
    /// List categories
    Categories,
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Order everything in the cart
    Checkout {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        phone: String,
        #[arg(short, long, default_value = "courier")]
        delivery: DeliveryMethod,
        #[arg(long, default_value = "cash")]
        payment: PaymentMethod,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Your orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Back-office commands (admin only)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Change your display name
    Username { new_username: String },
    /// Change your password (both prompted on stdin)
    Password,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart lines and subtotal
    Show,
    /// Add a product
    Add {
        product: ProductId,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Add one more unit of a product already in the cart
    Inc { product: ProductId },
    /// Remove one unit (the line goes away at zero)
    Dec { product: ProductId },
    /// Remove a cart line
    Remove { line: CartLineId },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List your orders
    List,
    /// Show one of your orders
    Show { id: OrderId },
}

#[derive(Subcommand)]
enum AdminAction {
    /// List all orders
    Orders {
        #[arg(short, long)]
        status: Option<OrderStatus>,
    },
    /// Show any order
    Order { id: OrderId },
    /// Change an order's status
    SetStatus { id: OrderId, status: OrderStatus },
    /// Order statistics
    Stats,
    /// List users
    Users,
    /// Grant or revoke admin rights
    SetRole {
        id: UserId,
        #[arg(long)]
        admin: bool,
    },
    /// Delete a user
    DeleteUser { id: UserId },
    /// Create a category
    CreateCategory { name: String },
    /// Rename a category
    RenameCategory { id: CategoryId, name: String },
    /// Delete a category
    DeleteCategory { id: CategoryId },
    /// Delete a product
    DeleteProduct { id: ProductId },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_storefront=warn,bazaar_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    let ctx = commands::Context::open(config).await?;

    let result = match cli.command {
        Commands::Login { login, password } => commands::auth::login(&ctx, &login, password).await,
        Commands::Register {
            login,
            username,
            email,
            password,
        } => commands::auth::register(&ctx, login, username, &email, password).await,
        Commands::Logout => commands::auth::logout(&ctx).await,
        Commands::Whoami => commands::auth::whoami(&ctx),
        Commands::Profile { action } => match action {
            ProfileAction::Username { new_username } => {
                commands::auth::change_username(&ctx, &new_username).await
            }
            ProfileAction::Password => commands::auth::change_password(&ctx).await,
        },
        Commands::Products {
            category,
            search,
            skip,
            limit,
        } => commands::catalog::products(&ctx, category, search, skip, limit).await,
        Commands::Product { id } => commands::catalog::product(&ctx, id).await,
        Commands::Categories => commands::catalog::categories(&ctx).await,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx),
            CartAction::Add { product, quantity } => commands::cart::add(&ctx, product, quantity).await,
            CartAction::Inc { product } => commands::cart::increment(&ctx, product).await,
            CartAction::Dec { product } => commands::cart::decrement(&ctx, product).await,
            CartAction::Remove { line } => commands::cart::remove(&ctx, line).await,
        },
        Commands::Checkout {
            address,
            phone,
            delivery,
            payment,
            notes,
        } => commands::cart::checkout(&ctx, address, phone, delivery, payment, notes).await,
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::orders::list(&ctx).await,
            OrdersAction::Show { id } => commands::orders::show(&ctx, id).await,
        },
        Commands::Admin { action } => run_admin(&ctx, action).await,
    };

    // Keep the session file in step with refreshes and invalidations, even
    // when the command itself failed.
    ctx.persist_session()?;
    result
}

async fn run_admin(ctx: &commands::Context, action: AdminAction) -> Result<(), CliError> {
    commands::admin::require_admin(ctx)?;
    match action {
        AdminAction::Orders { status } => commands::admin::orders(ctx, status).await,
        AdminAction::Order { id } => commands::admin::order(ctx, id).await,
        AdminAction::SetStatus { id, status } => commands::admin::set_status(ctx, id, status).await,
        AdminAction::Stats => commands::admin::stats(ctx).await,
        AdminAction::Users => commands::admin::users(ctx).await,
        AdminAction::SetRole { id, admin } => commands::admin::set_role(ctx, id, admin).await,
        AdminAction::DeleteUser { id } => commands::admin::delete_user(ctx, id).await,
        AdminAction::CreateCategory { name } => commands::admin::create_category(ctx, &name).await,
        AdminAction::RenameCategory { id, name } => {
            commands::admin::rename_category(ctx, id, &name).await
        }
        AdminAction::DeleteCategory { id } => commands::admin::delete_category(ctx, id).await,
        AdminAction::DeleteProduct { id } => commands::admin::delete_product(ctx, id).await,
    }
}
