//! Storefront CLI - shop against the storefront backend from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the credential is kept in STOREFRONT_TOKEN_FILE)
//! SF_PASSWORD=secret sf-cli login -e ann@example.com
//!
//! # Browse and fill the cart
//! sf-cli products list --search mug --category kitchen
//! sf-cli cart add 42 --quantity 2
//! sf-cli cart show
//!
//! # Place the order
//! sf-cli checkout --payment-method card
//!
//! # Vendors manage their listings
//! sf-cli vendor create --name Mug --price 12.50 --stock 10 --category kitchen
//! ```
//!
//! # Environment Variables
//!
//! See `storefront_client::config`. Additionally:
//! - `SF_LOG_FORMAT` - `json` for JSON log lines on stderr
//! - `SF_PASSWORD` / `SF_NEW_PASSWORD` - Passwords for `login`, `signup` and `profile password`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storefront_client::{ClientConfig, FileTokenStore, Storefront};
use storefront_core::{
    CartItemId, Email, OrderId, OrderStatus, Price, ProductId, UserRole,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(author, version, about = "Storefront shopping client")]
struct Cli {
    /// Backend base URL (overrides `STOREFRONT_API_URL`)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Credential file (overrides `STOREFRONT_TOKEN_FILE`)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Email,

        #[arg(short, long, env = "SF_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(short, long)]
        email: Email,

        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "SF_PASSWORD", hide_env_values = true)]
        password: String,

        /// Account role (`customer`, `vendor`)
        #[arg(short, long, default_value = "customer")]
        role: UserRole,
    },
    /// Forget the stored credential
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage the signed-in account
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Browse the catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Inspect and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for the cart contents
    Checkout {
        /// Payment method (`card`, `paypal`)
        #[arg(long, default_value = "card")]
        payment_method: String,

        /// Keep the local cart view after the order is placed
        #[arg(long)]
        keep_cart: bool,
    },
    /// Complete an externally approved payment
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },
    /// Order history
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Manage your product listings (vendors and admins)
    Vendor {
        #[command(subcommand)]
        action: VendorAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Change username and/or email
    Update {
        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        email: Option<Email>,
    },
    /// Change the account password
    Password {
        #[arg(long, env = "SF_PASSWORD", hide_env_values = true)]
        current: String,

        #[arg(long = "new", env = "SF_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,

        /// Repeat of the new password (defaults to `--new`)
        #[arg(long)]
        confirm: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List active products
    List {
        #[arg(short, long)]
        search: Option<String>,

        /// Category filter (`all` for every category)
        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, default_value_t = 0)]
        skip: u64,

        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Show one product
    Show { id: ProductId },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        product_id: ProductId,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (0 or less removes it)
    Update {
        item_id: CartItemId,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove { item_id: CartItemId },
}

#[derive(Subcommand)]
enum PaymentAction {
    /// Execute an approved payment
    Execute {
        #[arg(long)]
        payment_id: String,

        #[arg(long)]
        payer_id: String,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List your orders
    List,
    /// Show one order
    Show { id: OrderId },
    /// Cancel an order that has not been confirmed yet
    Cancel { id: OrderId },
    /// Move an order to a new status (vendors and admins)
    Status { id: OrderId, status: OrderStatus },
}

#[derive(Subcommand)]
enum VendorAction {
    /// List your products
    List,
    /// Create a product
    Create(ProductFields),
    /// Update a product; only the given fields change
    Update {
        id: ProductId,

        #[command(flatten)]
        fields: ProductPatch,
    },
    /// Delete a product
    Delete { id: ProductId },
}

#[derive(Args)]
struct ProductFields {
    #[arg(long)]
    name: String,

    #[arg(long, default_value = "")]
    description: String,

    #[arg(long)]
    price: Price,

    #[arg(long, default_value_t = 0)]
    stock: i64,

    #[arg(long, default_value = "general")]
    category: String,

    #[arg(long)]
    image_url: Option<String>,
}

#[derive(Args)]
struct ProductPatch {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    price: Option<Price>,

    #[arg(long)]
    stock: Option<i64>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    image_url: Option<String>,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::debug!("Sentry initialized");
    Some(guard)
}

/// Send warnings and errors to Sentry as events; keep info and debug as breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

/// Logs go to stderr so command output on stdout stays pipeable.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_client=info,storefront_cli=info".into());
    let json = std::env::var("SF_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url)?;
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = token_file;
    }
    let _sentry_guard = init_sentry(&config);

    let store = Arc::new(FileTokenStore::new(&config.token_file));
    let storefront = Storefront::new(&config, store)?;
    if let Err(e) = storefront.restore().await {
        tracing::warn!(error = %e, "could not restore session");
    }

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&storefront, &email, password).await?;
        }
        Commands::Signup {
            email,
            username,
            password,
            role,
        } => commands::account::signup(&storefront, &email, &username, password, role).await?,
        Commands::Logout => commands::account::logout(&storefront).await,
        Commands::Whoami => commands::account::whoami(&storefront)?,
        Commands::Profile { action } => match action {
            ProfileAction::Update { username, email } => {
                commands::account::update_profile(&storefront, username, email).await?;
            }
            ProfileAction::Password {
                current,
                new_password,
                confirm,
            } => {
                commands::account::change_password(&storefront, current, new_password, confirm)
                    .await?;
            }
        },
        Commands::Products { action } => match action {
            ProductsAction::List {
                search,
                category,
                skip,
                limit,
            } => commands::shop::list_products(&storefront, search, category, skip, limit).await?,
            ProductsAction::Show { id } => commands::shop::show_product(&storefront, id).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::show_cart(&storefront).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::shop::add_to_cart(&storefront, product_id, quantity).await?,
            CartAction::Update { item_id, quantity } => {
                commands::shop::update_quantity(&storefront, item_id, quantity).await?;
            }
            CartAction::Remove { item_id } => {
                commands::shop::remove_from_cart(&storefront, item_id).await?;
            }
        },
        Commands::Checkout {
            payment_method,
            keep_cart,
        } => commands::orders::checkout(&storefront, &payment_method, keep_cart).await?,
        Commands::Payment { action } => match action {
            PaymentAction::Execute {
                payment_id,
                payer_id,
            } => commands::orders::execute_payment(&storefront, &payment_id, &payer_id).await?,
        },
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::orders::list(&storefront).await?,
            OrdersAction::Show { id } => commands::orders::show(&storefront, id).await?,
            OrdersAction::Cancel { id } => commands::orders::cancel(&storefront, id).await?,
            OrdersAction::Status { id, status } => {
                commands::orders::update_status(&storefront, id, status).await?;
            }
        },
        Commands::Vendor { action } => match action {
            VendorAction::List => commands::vendor::list(&storefront).await?,
            VendorAction::Create(fields) => {
                commands::vendor::create(&storefront, &fields.into_new_product()).await?;
            }
            VendorAction::Update { id, fields } => {
                commands::vendor::update(&storefront, id, &fields.into_changes()).await?;
            }
            VendorAction::Delete { id } => commands::vendor::delete(&storefront, id).await?,
        },
    }
    Ok(())
}

impl ProductFields {
    fn into_new_product(self) -> storefront_core::NewProduct {
        storefront_core::NewProduct {
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category: self.category,
            image_url: self.image_url,
        }
    }
}

impl ProductPatch {
    fn into_changes(self) -> storefront_core::ProductChanges {
        storefront_core::ProductChanges {
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category: self.category,
            image_url: self.image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cart_update_with_negative_quantity() {
        let cli = Cli::try_parse_from(["sf-cli", "cart", "update", "7", "-1"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Cart {
                action: CartAction::Update { quantity: -1, .. }
            })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_email() {
        assert!(Cli::try_parse_from(["sf-cli", "login", "-e", "nope", "-p", "x"]).is_err());
    }

    #[test]
    fn test_parse_vendor_create() {
        let cli = Cli::try_parse_from([
            "sf-cli", "vendor", "create", "--name", "Mug", "--price", "12.50", "--stock", "3",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Vendor {
                action: VendorAction::Create(ProductFields { stock: 3, .. })
            })
        ));
    }
}
