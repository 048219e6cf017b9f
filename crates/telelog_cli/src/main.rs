//! Telelog CLI
//!
//! Command-line tools for recording and inspecting log packages.
//!
//! # Commands
//!
//! - `list` - List the packages under the recording root
//! - `info` - Display package metadata and per-tag statistics
//! - `tags` - List the tags of a package
//! - `dump` - Print messages in write order
//! - `filter` - Print the messages matching a filter
//! - `record` - Record UDP channels into packages

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Telelog command-line tools.
#[derive(Parser)]
#[command(name = "telelog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Recording root holding the packages
    #[arg(global = true, short, long, default_value = "logs")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List packages, most recent first
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display package metadata
    Info {
        /// Package name (latest clean package if omitted)
        name: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the tags of a package
    Tags {
        /// Package name (latest clean package if omitted)
        name: Option<String>,
    },

    /// Print messages in write order
    Dump {
        /// Package name (latest clean package if omitted)
        name: Option<String>,

        /// Maximum number of messages to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the messages matching a filter
    Filter {
        /// Package name (latest clean package if omitted)
        name: Option<String>,

        /// Tag to include (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Earliest timestamp (ns, inclusive)
        #[arg(long, conflicts_with = "at")]
        from: Option<i64>,

        /// Latest timestamp (ns, inclusive)
        #[arg(long, conflicts_with = "at")]
        to: Option<i64>,

        /// Anchor at the message closest at or before this timestamp (ns)
        #[arg(long)]
        at: Option<i64>,

        /// First position
        #[arg(long)]
        start: Option<u64>,

        /// Last position (inclusive)
        #[arg(long)]
        end: Option<u64>,

        /// Maximum number of messages
        #[arg(short, long)]
        count: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Record UDP channels until the duration elapses or stdin closes
    Record {
        /// JSON file mapping tags to [group, port]
        #[arg(short, long)]
        channels: PathBuf,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Rotate packages once the message file reaches this many MB
        #[arg(long)]
        max_package_mb: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { format } => {
            commands::list::run(&cli.root, &format)?;
        }
        Commands::Info { name, format } => {
            commands::info::run(&cli.root, name.as_deref(), &format)?;
        }
        Commands::Tags { name } => {
            commands::info::run_tags(&cli.root, name.as_deref())?;
        }
        Commands::Dump {
            name,
            limit,
            format,
        } => {
            commands::dump::run(&cli.root, name.as_deref(), limit, &format)?;
        }
        Commands::Filter {
            name,
            tags,
            from,
            to,
            at,
            start,
            end,
            count,
            format,
        } => {
            let args = commands::filter::FilterArgs {
                tags,
                from,
                to,
                at,
                start,
                end,
                count,
            };
            commands::filter::run(&cli.root, name.as_deref(), &args, &format)?;
        }
        Commands::Record {
            channels,
            duration,
            max_package_mb,
        } => {
            commands::record::run(&cli.root, &channels, duration, max_package_mb)?;
        }
        Commands::Version => {
            println!("Telelog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Telelog Core v{}", telelog_core::VERSION);
        }
    }

    Ok(())
}
