//! sb - short-lived Docker sandboxes.
//!
//! This is the main entry point for the sb CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::ConflictArg;
use sbhub_sandbox::CreateRequest;
use sbhub_util::{LogConfig, LogLevel};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sb")]
#[command(author, version, about = "Short-lived Docker sandboxes with persistent data", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file merged over the global one
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start a sandbox
    Create {
        /// Sandbox name (generated when omitted)
        name: Option<String>,
        /// Size tier: small, medium, large or xlarge
        #[arg(short, long)]
        size: Option<String>,
        /// Time to live, e.g. 2h or 45m (tier default when omitted)
        #[arg(short, long, value_parser = parse_ttl)]
        ttl: Option<Duration>,
        /// Custom image instead of the tier image
        #[arg(short, long)]
        image: Option<String>,
        /// Restore data from a snapshot tag first
        #[arg(short, long, value_name = "TAG")]
        restore: Option<String>,
        /// Publish this container port on a free host port
        #[arg(short = 'p', long, value_name = "PORT")]
        expose: Option<u16>,
        /// Environment variable passed to the container (KEY=value)
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// What to do when data for this name already exists
        #[arg(long, value_enum, default_value_t = ConflictArg::Ask)]
        on_conflict: ConflictArg,
    },
    /// Bind a sandbox to another data folder under the storage root
    Attach {
        name: String,
        /// Folder name under the storage root
        folder: String,
    },
    /// Recreate a sandbox without its data mount
    Detach { name: String },
    /// Give a sandbox a fresh time to live
    Renew {
        name: String,
        /// New time to live from now
        #[arg(short, long, default_value = "1h", value_parser = parse_ttl)]
        ttl: Duration,
    },
    /// Remove a sandbox, keeping its data unless told otherwise
    #[command(alias = "rm")]
    Remove {
        name: String,
        /// Also delete the data directory
        #[arg(short = 'f', long, conflicts_with = "vol_only")]
        force_all: bool,
        /// Delete the data directory only
        #[arg(long)]
        vol_only: bool,
    },
    /// List sandboxes, archived data and snapshots
    #[command(alias = "ls")]
    List,
    /// Show sandbox logs
    Logs {
        name: String,
        /// Keep streaming new lines
        #[arg(short, long)]
        follow: bool,
        /// Number of lines from the end
        #[arg(short = 'n', long, default_value_t = 50)]
        tail: usize,
    },
    /// Open a shell inside a running sandbox
    #[command(aliases = ["enter", "shell", "exec"])]
    Console { name: String },
    /// Snapshot sandbox data under a tag
    Save { name: String, tag: String },
    /// Create sandboxes from a Dockerfile or docker-compose project
    Import {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
        /// What to do when data for a sandbox already exists
        #[arg(long, value_enum, default_value_t = ConflictArg::Ask)]
        on_conflict: ConflictArg,
    },
    /// Remove expired sandboxes and archive their data
    Janitor {
        /// Sweep once and exit
        #[arg(long)]
        once: bool,
        /// Log to the log directory instead of stderr
        #[arg(long)]
        log_file: bool,
    },
    /// Print version information
    Version,
}

fn parse_ttl(s: &str) -> Result<Duration, String> {
    let ttl = sbhub_util::parse_duration(s)
        .map_err(|e| format!("invalid duration '{}': {}", s, e))?;
    if ttl.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(ttl)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = sbhub_util::log::init(LogConfig {
        level: LogLevel::from_verbose(cli.verbose),
        include_location: false,
        to_file: matches!(cli.command, Commands::Janitor { log_file: true, .. }),
    });

    let result = run(cli).await;

    if let Some(path) = log_file {
        eprintln!("Logs: {}", path.display());
    }

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Create {
            name,
            size,
            ttl,
            image,
            restore,
            expose,
            env,
            on_conflict,
        } => {
            let request = CreateRequest {
                name,
                size,
                image,
                ttl,
                restore_tag: restore,
                expose,
                env,
            };
            commands::handle_create(&commands::connect(config).await?, request, on_conflict).await
        }
        Commands::Attach { name, folder } => {
            commands::handle_attach(&commands::connect(config).await?, &name, &folder).await
        }
        Commands::Detach { name } => {
            commands::handle_detach(&commands::connect(config).await?, &name).await
        }
        Commands::Renew { name, ttl } => {
            commands::handle_renew(&commands::connect(config).await?, &name, ttl).await
        }
        Commands::Remove {
            name,
            force_all,
            vol_only,
        } => {
            let wipe = commands::wipe_choice(force_all, vol_only);
            commands::handle_remove(config, &name, wipe).await
        }
        Commands::List => commands::handle_list(&commands::connect(config).await?).await,
        Commands::Logs { name, follow, tail } => {
            commands::handle_logs(&commands::connect(config).await?, &name, follow, tail).await
        }
        Commands::Console { name } => {
            commands::handle_console(&commands::connect(config).await?, &name).await
        }
        Commands::Save { name, tag } => commands::handle_save(config, &name, &tag).await,
        Commands::Import { path, on_conflict } => {
            commands::handle_import(&commands::connect(config).await?, &path, on_conflict).await
        }
        Commands::Janitor { once, .. } => {
            commands::handle_janitor(&commands::connect(config).await?, once).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_version() {
    println!("sb {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Short-lived Docker sandboxes with persistent data and automatic expiry.");
}
