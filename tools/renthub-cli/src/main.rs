//! RentHub CLI - administer a RentHub marketplace from the command line.
//!
//! Commands:
//! - `renthub init` - Create a config file and the category tree
//! - `renthub category` - List or rebuild categories
//! - `renthub product` - Create, edit, delete, show and search listings
//! - `renthub review` - Add and list reviews
//! - `renthub ratings` - Sweep, reindex and audit search index ratings
//! - `renthub tasks` - Run and inspect deferred tasks
//! - `renthub ipn` - Process a PayPal payment notification
//! - `renthub payments` - List or clear payment records
//! - `renthub profile` - Show or save user profiles
//! - `renthub admin` - Bulk data operations
//! - `renthub config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    AdminArgs, CategoryArgs, ConfigArgs, InitArgs, IpnArgs, PaymentsArgs, ProductArgs,
    ProfileArgs, RatingsArgs, ReviewArgs, TasksArgs,
};

/// RentHub CLI - Manage a rental marketplace
#[derive(Parser)]
#[command(name = "renthub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config file and build the category tree
    Init(InitArgs),

    /// Manage categories
    Category(CategoryArgs),

    /// Manage product listings
    Product(ProductArgs),

    /// Manage reviews
    Review(ReviewArgs),

    /// Keep search index ratings in sync
    Ratings(RatingsArgs),

    /// Run and inspect deferred tasks
    Tasks(TasksArgs),

    /// Process a PayPal payment notification
    Ipn(IpnArgs),

    /// Manage payment records
    Payments(PaymentsArgs),

    /// Manage user profiles
    Profile(ProfileArgs),

    /// Administrative bulk operations
    Admin(AdminArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    let mut logging = ctx.config.logging.clone();
    if cli.verbose {
        logging.level = renthub_observability::LogLevel::Debug;
    }
    renthub_observability::init_logging(&logging);

    // Execute command
    let result = match cli.command {
        Commands::Init(args) => commands::init::run(args, &ctx).await,
        Commands::Category(args) => commands::category::run(args, &ctx).await,
        Commands::Product(args) => commands::product::run(args, &ctx).await,
        Commands::Review(args) => commands::review::run(args, &ctx).await,
        Commands::Ratings(args) => commands::ratings::run(args, &ctx).await,
        Commands::Tasks(args) => commands::tasks::run(args, &ctx).await,
        Commands::Ipn(args) => commands::ipn::run(args, &ctx).await,
        Commands::Payments(args) => commands::payments::run(args, &ctx).await,
        Commands::Profile(args) => commands::profile::run(args, &ctx).await,
        Commands::Admin(args) => commands::admin::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
