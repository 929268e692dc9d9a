mod commands;
mod input;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use groupdav_core::{DateRange, DavConfig};

#[derive(Parser)]
#[command(name = "groupdav")]
#[command(about = "Run recurrence expansion, calendar queries, free/busy and scheduling on local .ics files")]
struct Cli {
    /// Config file (defaults to ~/.config/groupdav/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the occurrences of one calendar object
    Expand {
        file: PathBuf,

        /// Window start (YYYY-MM-DD, RFC 3339 or 20240101T000000Z)
        #[arg(long)]
        from: Option<String>,

        /// Window end, exclusive
        #[arg(long)]
        to: Option<String>,

        /// Print the expanded iCalendar object instead of a list
        #[arg(long)]
        ics: bool,
    },
    /// First and last occurrence of one calendar object
    Bounds { file: PathBuf },
    /// Run a calendar-query over a directory of .ics files
    Query {
        dir: PathBuf,

        /// Component to match (VEVENT or VTODO)
        #[arg(long, default_value = "VEVENT")]
        comp: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Property text match, e.g. SUMMARY=standup (case-insensitive substring)
        #[arg(long)]
        text: Vec<String>,

        /// JSON comp-filter; replaces --comp/--from/--to/--text
        #[arg(long)]
        filter: Option<PathBuf>,
    },
    /// Busy time of one user over a directory of .ics files
    Freebusy {
        dir: PathBuf,

        /// Email of the user
        #[arg(long)]
        user: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Merge overlapping intervals
        #[arg(long)]
        merge: bool,

        /// Print a VFREEBUSY object
        #[arg(long)]
        ics: bool,
    },
    /// iTIP messages caused by replacing one version of an object with another
    Schedule {
        /// Email of the calendar owner
        #[arg(long)]
        owner: String,

        /// Previous version; omit for a creation
        #[arg(long)]
        former: Option<PathBuf>,

        /// New version; omit for a deletion
        #[arg(long)]
        current: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DavConfig::load_from(path)?,
        None => DavConfig::load()?,
    };

    match cli.command {
        Commands::Expand { file, from, to, ics } => {
            let range = parse_range(from.as_deref(), to.as_deref())?;
            commands::expand::run(&config, &file, range, ics, cli.json)
        }
        Commands::Bounds { file } => commands::bounds::run(&config, &file, cli.json),
        Commands::Query {
            dir,
            comp,
            from,
            to,
            text,
            filter,
        } => {
            let range = parse_range(from.as_deref(), to.as_deref())?;
            let filter = match filter {
                Some(path) => commands::query::load_filter(&path)?,
                None => commands::query::build_filter(&comp, range, &text)?,
            };
            commands::query::run(&config, &dir, &filter, cli.json)
        }
        Commands::Freebusy {
            dir,
            user,
            from,
            to,
            merge,
            ics,
        } => {
            let range = parse_range(Some(&from), Some(&to))?;
            commands::freebusy::run(&config, &dir, &user, range, merge, ics, cli.json)
        }
        Commands::Schedule {
            owner,
            former,
            current,
        } => commands::schedule::run(
            &config,
            &owner,
            former.as_deref(),
            current.as_deref(),
            cli.json,
        ),
    }
}

fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
    DateRange::from_args(from, to).map_err(|e| anyhow::anyhow!(e))
}
