use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tourlite::cli::{self as prog_cli, Command, OutputMode};
use tourlite::{AppConfig, Catalog, DocumentId, Resource};

fn id_arg(s: &str) -> Result<DocumentId, String> {
    prog_cli::parse_id(s).map_err(|e| e.to_string())
}

fn resource_arg(s: &str) -> Result<Resource, String> {
    s.parse::<Resource>().map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "tourlite", version, about = "Tours/reviews catalog with request-driven queries")]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Must exist when given.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Directory of <collection>.ndjson files; in-memory when unset")]
    data_dir: Option<PathBuf>,
    #[arg(long, help = "Directory for app/audit/metrics logs")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "Log level: off, error, warn, info, debug, trace")]
    log_level: Option<String>,
    #[arg(long, help = "Upper bound for the `limit` request key")]
    max_limit: Option<usize>,
    #[arg(long, help = "Pretty-print JSON instead of NDJSON")]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "List documents using key=value request pairs (e.g. price[lt]=500 sort=-price page=2)")]
    List {
        #[arg(value_parser = resource_arg, help = "tours, users or reviews")]
        resource: Resource,
        #[arg(help = "Request pairs")]
        pairs: Vec<String>,
        #[arg(long, value_parser = id_arg, help = "Only reviews of this tour")]
        tour: Option<DocumentId>,
    },
    #[command(about = "Fetch one document by id; tours include their reviews")]
    Get {
        #[arg(value_parser = resource_arg)]
        resource: Resource,
        #[arg(value_parser = id_arg)]
        id: DocumentId,
    },
    #[command(name = "top-cheap", about = "Five best-rated, cheapest tours")]
    TopCheap {
        #[arg(help = "Extra request pairs")]
        pairs: Vec<String>,
    },
    #[command(about = "Per-difficulty tour statistics")]
    Stats,
    #[command(about = "Insert NDJSON records through the normal create path")]
    Import {
        #[arg(value_parser = resource_arg)]
        resource: Resource,
        file: PathBuf,
    },
    #[command(subcommand, about = "Create, update or delete tours")]
    Tour(TourCommands),
    #[command(subcommand, about = "Create users")]
    User(UserCommands),
    #[command(subcommand, about = "Add, update or delete reviews")]
    Review(ReviewCommands),
    #[command(about = "Recompute a tour's rating summary from its reviews")]
    Recompute {
        #[arg(value_parser = id_arg)]
        tour: DocumentId,
    },
}

#[derive(Subcommand, Debug)]
enum TourCommands {
    Create {
        #[arg(help = "Tour JSON")]
        json: String,
    },
    Update {
        #[arg(value_parser = id_arg)]
        id: DocumentId,
        #[arg(help = "Fields to set, as JSON")]
        json: String,
    },
    Delete {
        #[arg(value_parser = id_arg)]
        id: DocumentId,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    Create {
        #[arg(help = "User JSON")]
        json: String,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewCommands {
    Add {
        #[arg(long, value_parser = id_arg, help = "Tour being reviewed; overrides `tour` in the body")]
        tour: Option<DocumentId>,
        #[arg(long, value_parser = id_arg, help = "Reviewing user; fills `user` when the body has none")]
        user: Option<DocumentId>,
        #[arg(help = "Review JSON")]
        json: String,
    },
    Update {
        #[arg(value_parser = id_arg)]
        id: DocumentId,
        json: String,
    },
    Delete {
        #[arg(value_parser = id_arg)]
        id: DocumentId,
    },
}

impl From<Commands> for Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::List { resource, pairs, tour } => Self::List { resource, pairs, tour },
            Commands::Get { resource, id } => Self::Get { resource, id },
            Commands::TopCheap { pairs } => Self::TopCheap { pairs },
            Commands::Stats => Self::Stats,
            Commands::Import { resource, file } => Self::Import { resource, file },
            Commands::Tour(TourCommands::Create { json }) => Self::TourCreate { json },
            Commands::Tour(TourCommands::Update { id, json }) => Self::TourUpdate { id, json },
            Commands::Tour(TourCommands::Delete { id }) => Self::TourDelete { id },
            Commands::User(UserCommands::Create { json }) => Self::UserCreate { json },
            Commands::Review(ReviewCommands::Add { tour, user, json }) => Self::ReviewAdd { tour, user, json },
            Commands::Review(ReviewCommands::Update { id, json }) => Self::ReviewUpdate { id, json },
            Commands::Review(ReviewCommands::Delete { id }) => Self::ReviewDelete { id },
            Commands::Recompute { tour } => Self::Recompute { tour },
        }
    }
}

fn real_main(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = AppConfig {
        data_dir: cli.data_dir,
        log_dir: cli.log_dir,
        log_level: cli.log_level,
        max_limit: cli.max_limit,
        ..AppConfig::default()
    };
    let cfg = AppConfig::load(overrides, cli.config.as_deref())?;
    tourlite::logger::configure_logging(
        cfg.log_dir.as_deref(),
        cfg.log_level.as_deref(),
        cfg.log_retention,
        cfg.dev6.unwrap_or(false),
    )?;

    let catalog = Catalog::open(cfg)?;
    let cmd: Command = cli.command.into();
    let mutates = cmd.is_mutation();
    let mode = if cli.pretty { OutputMode::Pretty } else { OutputMode::Ndjson };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    prog_cli::run_with_format(&catalog, cmd, mode, &mut out)?;
    out.flush()?;
    if mutates {
        catalog.flush()?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = real_main(cli) {
        log::error!("command failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
