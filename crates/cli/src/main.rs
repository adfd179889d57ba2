//! Voltshop CLI - Drive the cart and wishlist synchronizer from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show mode, cart, and wishlist
//! vs-cli status
//!
//! # Add two units to the cart, caching display info for guest mode
//! vs-cli cart add 65f1a2b3c4d5e6f708192a3b -q 2 --title "Relay Board" --price 12.50
//!
//! # Toggle a product on the wishlist
//! vs-cli wishlist toggle 65f1a2b3c4d5e6f708192a3b
//!
//! # Reload both collections from the account store
//! VOLTSHOP_API_TOKEN=... vs-cli sync
//! ```
//!
//! # Commands
//!
//! - `status` - Show session mode and both collections
//! - `cart` - Show, add, remove, set quantity, clear
//! - `wishlist` - Show, toggle, add, remove, clear
//! - `sync` - Force a reload from the account store
//!
//! Guest mode is used unless `VOLTSHOP_API_TOKEN` is set.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voltshop_sync::SyncConfig;

mod commands;

#[derive(Parser)]
#[command(name = "vs-cli")]
#[command(author, version, about = "Voltshop cart and wishlist tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show session mode, cart, and wishlist
    Status,
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Reload the cart and wishlist from the account store
    Sync,
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and totals
    Show,
    /// Add units of a product
    Add {
        /// Product ID
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Product title cached for display
        #[arg(long)]
        title: Option<String>,

        /// Unit price cached for totals
        #[arg(long)]
        price: Option<Decimal>,

        /// Product image URL cached for display
        #[arg(long)]
        image: Option<String>,
    },
    /// Remove a product's line
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Set a line's quantity (zero or less removes it)
    Set {
        /// Product ID
        product_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove every line
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// List wishlist entries
    Show,
    /// Add the product if absent, remove it otherwise
    Toggle {
        /// Product ID
        product_id: String,
    },
    /// Add a product
    Add {
        /// Product ID
        product_id: String,
    },
    /// Remove a product
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Remove every entry
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

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

    // Sentry must be initialized before the tracing subscriber
    let config = SyncConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voltshop_cli=info,voltshop_sync=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = commands::open_session(config).await?;

    match cli.command {
        Commands::Status => commands::status::show(&session, config),
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&session),
            CartAction::Add {
                product_id,
                quantity,
                title,
                price,
                image,
            } => {
                let info = voltshop_core::CartLineInfo {
                    title,
                    price,
                    image,
                };
                commands::cart::add(&session, &product_id, quantity, info).await?;
            }
            CartAction::Remove { product_id } => {
                commands::cart::remove(&session, &product_id).await?;
            }
            CartAction::Set {
                product_id,
                quantity,
            } => commands::cart::set_quantity(&session, &product_id, quantity).await?,
            CartAction::Clear => commands::cart::clear(&session).await?,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(&session),
            WishlistAction::Toggle { product_id } => {
                commands::wishlist::toggle(&session, &product_id).await?;
            }
            WishlistAction::Add { product_id } => {
                commands::wishlist::add(&session, &product_id).await?;
            }
            WishlistAction::Remove { product_id } => {
                commands::wishlist::remove(&session, &product_id).await?;
            }
            WishlistAction::Clear => commands::wishlist::clear(&session).await?,
        },
        Commands::Sync => commands::sync::report(&session, config),
    }
    Ok(())
}
