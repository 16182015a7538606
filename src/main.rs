use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lobstream::cli::LobTarget;
use lobstream::cli::commands::transfer::SessionOptions;
use lobstream::lob::TextEncoding;

#[derive(Parser)]
#[command(name = "lobstream")]
#[command(
    version,
    about = "Stream files into and out of database large object columns"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(short, long, help = "Table holding the large object")]
    table: String,
    #[arg(short, long, help = "Large object column")]
    column: String,
    #[arg(
        short,
        long = "key",
        value_name = "NAME=VALUE",
        help = "Primary key column and value (repeatable)"
    )]
    keys: Vec<String>,
    #[arg(long = "where", value_name = "PREDICATE", help = "Raw row predicate")]
    predicate: Option<String>,
    #[arg(long, help = "Treat the column as text instead of binary")]
    text: bool,
    #[arg(long, value_parser = parse_encoding, help = "Byte encoding of text streams: utf-8, iso-8859-1")]
    encoding: Option<TextEncoding>,
}

#[derive(Args)]
struct SessionArgs {
    #[arg(
        short,
        long,
        env = "LOBSTREAM_DATA_SOURCE",
        help = "Data source name (default from config)"
    )]
    data_source: Option<String>,
    #[arg(short, long, help = "Module tag for the session")]
    module: Option<String>,
    #[arg(long, help = "Print the transfer report as JSON")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace a large object value with the contents of a file
    Upload {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[arg(help = "Source file, or - for stdin")]
        file: PathBuf,
    },

    /// Write a large object value to a file
    Download {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[arg(help = "Destination file, or - for stdout")]
        file: PathBuf,
    },

    /// Reset a large object value to empty
    Clear {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize project configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

fn parse_encoding(s: &str) -> Result<TextEncoding, String> {
    s.parse().map_err(|e: lobstream::LobError| e.to_string())
}

impl From<TargetArgs> for LobTarget {
    fn from(args: TargetArgs) -> Self {
        Self {
            table: args.table,
            column: args.column,
            keys: args.keys,
            predicate: args.predicate,
            text: args.text || args.encoding.is_some(),
            encoding: args.encoding,
        }
    }
}

impl From<SessionArgs> for SessionOptions {
    fn from(args: SessionArgs) -> Self {
        Self {
            data_source: args.data_source,
            module: args.module,
            json: args.json,
        }
    }
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mlobstream encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    // Logs go to stderr: stdout may carry a downloaded payload
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    use lobstream::cli::commands::{config, transfer};

    match cli.command {
        Commands::Upload {
            target,
            session,
            file,
        } => {
            transfer::upload(&target.into(), &file, &session.into())?;
        }
        Commands::Download {
            target,
            session,
            file,
        } => {
            transfer::download(&target.into(), &file, &session.into())?;
        }
        Commands::Clear { target, session } => {
            transfer::clear(&target.into(), &session.into())?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => config::show(&format)?,
            ConfigAction::Path => config::path()?,
            ConfigAction::Init { force } => config::init(force)?,
        },
    }

    Ok(())
}
