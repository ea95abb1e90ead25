//! CLI command implementations.

pub mod admin;
pub mod category;
pub mod config;
pub mod init;
pub mod ipn;
pub mod payments;
pub mod product;
pub mod profile;
pub mod ratings;
pub mod review;
pub mod tasks;

use clap::{Args, Subcommand, ValueEnum};
use renthub_market::catalog::ProductParams;

/// Arguments for the init command.
#[derive(Args)]
pub struct InitArgs {
    /// PayPal account that receives payments.
    #[arg(long, default_value = "s01@test.com")]
    pub account_email: String,

    /// Overwrite an existing config file.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the category command.
#[derive(Args)]
pub struct CategoryArgs {
    #[command(subcommand)]
    pub command: Option<CategoryCommand>,
}

#[derive(Subcommand)]
pub enum CategoryCommand {
    /// List selectable categories.
    List,
    /// Delete all categories and build the tree again.
    Reset {
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Listing fields shared by create and update.
#[derive(Args, Clone)]
pub struct ProductFields {
    /// Listing title.
    #[arg(short, long)]
    pub name: String,

    /// Category name.
    #[arg(long)]
    pub category: String,

    /// Daily price, e.g. 45.00.
    #[arg(short, long)]
    pub price: String,

    /// Currency code (default: CAD).
    #[arg(long)]
    pub currency: Option<String>,

    /// Description indexed for search.
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Owner's user id.
    #[arg(long)]
    pub user: Option<String>,

    /// PayPal account of the owner.
    #[arg(long)]
    pub paypal_account: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    #[arg(long)]
    pub image_url: Option<String>,

    /// First rentable day (YYYY-MM-DD).
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last rentable day (YYYY-MM-DD).
    #[arg(long)]
    pub end_date: Option<String>,
}

impl ProductFields {
    /// Convert into the marketplace form.
    pub fn into_params(self, pid: Option<String>) -> ProductParams {
        ProductParams {
            pid,
            name: self.name,
            description: self.description,
            category: self.category,
            price: self.price,
            currency: self.currency,
            user_id: self.user,
            paypal_account: self.paypal_account,
            location: self.location,
            phone_number: self.phone,
            address: self.address,
            image_url: self.image_url,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// Arguments for the product command.
#[derive(Args)]
pub struct ProductArgs {
    #[command(subcommand)]
    pub command: ProductCommand,
}

#[derive(Subcommand)]
pub enum ProductCommand {
    /// Create a listing.
    Create {
        /// Product id (generated if omitted).
        #[arg(long)]
        pid: Option<String>,

        #[command(flatten)]
        fields: ProductFields,
    },
    /// Replace a listing's details.
    Update {
        /// Product id.
        pid: String,

        #[command(flatten)]
        fields: ProductFields,
    },
    /// Delete a listing with its reviews and search document.
    Delete {
        /// Product id.
        pid: String,
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Show a listing and its search document.
    Show {
        /// Product id.
        pid: String,
    },
    /// Search listings by text.
    Search {
        /// Search term.
        term: String,
    },
}

/// Arguments for the review command.
#[derive(Args)]
pub struct ReviewArgs {
    #[command(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Subcommand)]
pub enum ReviewCommand {
    /// Review a product.
    Add {
        /// Product id.
        pid: String,
        /// Rating from 1 to 5; values outside are clamped.
        #[arg(short, long, allow_negative_numbers = true)]
        rating: i64,
        /// Reviewer name.
        #[arg(short, long, default_value = "anonymous")]
        username: String,
        /// Review text.
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// List a product's counted reviews.
    List {
        /// Product id.
        pid: String,
    },
}

/// Arguments for the ratings command.
#[derive(Args)]
pub struct RatingsArgs {
    #[command(subcommand)]
    pub command: RatingsCommand,
}

#[derive(Subcommand)]
pub enum RatingsCommand {
    /// Reindex every product with a pending rating change.
    Sweep {
        /// Repeat the sweep every SECS seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Reindex one product's rating.
    Reindex {
        /// Product id.
        pid: String,
    },
    /// Compare stored ratings with the search index.
    Audit {
        /// Flag disagreeing products for the next sweep.
        #[arg(long)]
        mark_dirty: bool,
    },
}

/// Arguments for the tasks command.
#[derive(Args)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub command: Option<TasksCommand>,
}

#[derive(Subcommand)]
pub enum TasksCommand {
    /// Run every due task.
    Run,
    /// List pending tasks.
    List,
    /// List dead-lettered tasks.
    Dead,
    /// Move a dead-lettered task back to the queue.
    Retry {
        /// Task id.
        id: u64,
    },
}

/// PayPal's verification verdict to simulate.
#[derive(Clone, Copy, ValueEnum)]
pub enum VerifyStatus {
    #[value(name = "VERIFIED")]
    Verified,
    #[value(name = "INVALID")]
    Invalid,
}

/// Arguments for the ipn command.
#[derive(Args)]
pub struct IpnArgs {
    /// Notification body: form-encoded or a JSON object.
    pub file: String,

    /// Verification verdict to use.
    #[arg(long, value_enum, default_value = "VERIFIED")]
    pub status: VerifyStatus,
}

/// Arguments for the payments command.
#[derive(Args)]
pub struct PaymentsArgs {
    #[command(subcommand)]
    pub command: PaymentsCommand,
}

#[derive(Subcommand)]
pub enum PaymentsCommand {
    /// List a user's payments.
    List {
        /// User id.
        user: String,
    },
    /// Delete every payment record.
    Clear {
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the profile command.
#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommand,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Show a user's profile.
    Show {
        /// User id.
        user: String,
        /// Nickname to show if no profile is saved.
        #[arg(long, default_value = "")]
        nickname: String,
        /// Email to show if no profile is saved.
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Create or replace a user's profile.
    Set {
        /// User id.
        user: String,
        #[arg(short, long)]
        nickname: String,
        #[arg(short, long, default_value = "")]
        email: String,
        #[arg(short, long)]
        phone: Option<String>,
        /// Preferred meeting point.
        #[arg(short, long)]
        meet_point: Option<String>,
    },
}

/// Arguments for the admin command.
#[derive(Args)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Delete categories, products, reviews and search documents.
    DeleteData {
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
        /// Queue the deletion instead of running it now.
        #[arg(long)]
        deferred: bool,
    },
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
        /// PayPal account that receives payments.
        #[arg(long, default_value = "s01@test.com")]
        account_email: String,
    },
    /// Validate the config file.
    Validate,
}

/// Ask for confirmation unless `yes` was given.
pub fn confirm(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
