//! Command-line definition.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::auth::Role;
use crate::payment::PaymentMethod;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_SHA"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "kiosko")]
#[command(about = "Point of sale for small shops")]
#[command(version = VERSION)]
pub struct Cli {
    /// User to log in as
    #[arg(long, env = "KIOSKO_USER", global = true)]
    pub user: Option<String>,

    /// Password for --user
    #[arg(long, env = "KIOSKO_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Directory holding the database, tickets, reports and logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose console logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Today's sales, recent revenue, low stock and the last 7 days
    Dashboard,

    /// Product catalog
    Products {
        #[command(subcommand)]
        action: ProductsCmd,
    },

    /// Product categories
    Categories {
        #[command(subcommand)]
        action: CategoriesCmd,
    },

    /// Points of sale
    Points {
        #[command(subcommand)]
        action: PointsCmd,
    },

    /// Sales history
    Sales {
        #[command(subcommand)]
        action: SalesCmd,
    },

    /// Ring up a sale in one shot
    Sell(SellArgs),

    /// Interactive register reading commands from stdin
    Register,

    /// Generate random sales for demos
    Simulate(SimulateArgs),

    /// Excel reports
    Report {
        #[command(subcommand)]
        action: ReportCmd,
    },

    /// Stored settings
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },

    /// User accounts
    Users {
        #[command(subcommand)]
        action: UsersCmd,
    },

    /// Load the demo catalog into an empty database
    Seed,

    /// Show the logged-in user and what they can access
    Whoami,
}

#[derive(Subcommand, Debug)]
pub enum ProductsCmd {
    List,
    /// Match by exact barcode or name substring
    Search { term: String },
    Show { id: i64 },
    Add {
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value_t = 0)]
        stock: i64,
        /// Generated when omitted
        #[arg(long)]
        barcode: Option<String>,
        /// Category id
        #[arg(long)]
        category: Option<i64>,
        #[arg(long, default_value_t = 0)]
        min_stock: i64,
        #[arg(long, default_value = "")]
        supplier: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        barcode: Option<String>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        stock: Option<i64>,
        #[arg(long, conflicts_with = "no_category")]
        category: Option<i64>,
        /// Remove the category
        #[arg(long)]
        no_category: bool,
        #[arg(long)]
        min_stock: Option<i64>,
        #[arg(long)]
        supplier: Option<String>,
    },
    Price { id: i64, price: Decimal },
    /// Set absolute stock; recorded as an adjustment
    Stock { id: i64, stock: i64 },
    /// Flip the active flag
    Toggle { id: i64 },
    /// Stock movements, newest first
    Movements { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum CategoriesCmd {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Update {
        id: i64,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum PointsCmd {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SalesCmd {
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    Show { id: i64 },
    /// Sales between two dates, inclusive
    Range { from: NaiveDate, to: NaiveDate },
    /// Sales of one day (today by default)
    Day { date: Option<NaiveDate> },
    /// Daily totals for the last N days
    Daily {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[derive(clap::Args, Debug)]
pub struct SellArgs {
    /// CODE[:QTY], by barcode or product name; repeatable
    #[arg(long = "item", required = true)]
    pub items: Vec<String>,

    /// cash, debit, credit, card or transfer
    #[arg(long, default_value = "cash")]
    pub payment: PaymentMethod,

    /// Cash handed over (exact when omitted)
    #[arg(long)]
    pub received: Option<Decimal>,

    /// Discount percentage
    #[arg(long, default_value = "0")]
    pub discount: Decimal,

    /// Point of sale id
    #[arg(long)]
    pub point: Option<i64>,

    /// Sell even when the cart exceeds known stock
    #[arg(long)]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Multiplier on the wait between sales; 0 runs back to back
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum ReportCmd {
    Sales {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Stock {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Effective configuration, or one stored key
    Get { key: Option<String> },
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
pub enum UsersCmd {
    List,
    Add {
        username: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        password: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::dec;

    #[test]
    fn parses_sell_with_global_flags() {
        let cli = Cli::try_parse_from([
            "kiosko", "--user", "cajero1", "--password", "cajero", "--json", "sell", "--item",
            "7790001:2", "--item", "alfajor", "--payment", "debit", "--discount", "10",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.user.as_deref(), Some("cajero1"));
        match cli.command {
            Command::Sell(args) => {
                assert_eq!(args.items, vec!["7790001:2", "alfajor"]);
                assert_eq!(args.payment, PaymentMethod::DebitCard);
                assert_eq!(args.discount, dec("10"));
                assert!(args.received.is_none());
                assert!(!args.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sell_requires_an_item() {
        assert!(Cli::try_parse_from(["kiosko", "sell"]).is_err());
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["kiosko", "sales", "range", "2024-05-01", "2024-05-31"])
            .expect("parse");
        assert!(matches!(cli.command, Command::Sales { action: SalesCmd::Range { .. } }));

        let cli = Cli::try_parse_from(["kiosko", "products", "update", "3", "--no-category"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Products { action: ProductsCmd::Update { no_category: true, .. } }
        ));
        assert!(Cli::try_parse_from([
            "kiosko", "products", "update", "3", "--no-category", "--category", "2"
        ])
        .is_err());
    }
}
