use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rocket_launches::db::Database;
use rocket_launches::models::*;
use rocket_launches::query::{FetchSpec, SortDescriptor, SortKey};

#[derive(Parser)]
#[command(name = "rlaunch")]
#[command(about = "Inspect and edit a local rocket-launch store")]
struct Cli {
    /// Database file (defaults to ROCKET_LAUNCHES_DB or the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all lists
    Lists,
    /// Create a list
    NewList { title: String },
    /// Show launches
    Launches {
        /// Only unviewed launches in this list
        #[arg(long)]
        list: Option<String>,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// Only unviewed launches
        #[arg(long)]
        unviewed: bool,
        /// Only launches carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Create a launch into a list
    NewLaunch {
        #[arg(long)]
        list: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        launchpad: Option<String>,
        /// RFC 3339 launch date
        #[arg(long)]
        date: Option<String>,
        /// Comma-separated tag titles
        #[arg(long, default_value = "")]
        tags: String,
        /// File whose bytes become the attachment
        #[arg(long)]
        attachment: Option<PathBuf>,
    },
    /// Show tags used in a list
    Tags {
        #[arg(long)]
        list: String,
    },
    /// Mark a launch as viewed
    View { id: Uuid },
    /// Overlay a decoded feed file (JSON array) with local viewed state
    ImportFeed {
        file: PathBuf,
        /// Favorite every record into this list
        #[arg(long)]
        favorite_into: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Date,
}

impl SortArg {
    fn descriptors(self) -> Vec<SortDescriptor> {
        match self {
            Self::Name => vec![SortDescriptor::ascending(SortKey::Name)],
            Self::Date => vec![SortDescriptor::ascending(SortKey::LaunchDate)],
        }
    }
}

/// Initialize tracing on stderr so stdout stays clean JSON
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "rocket_launches=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn require_list(db: &Database, title: &str) -> Result<LaunchList> {
    db.get_list_by_title(title)?
        .ok_or_else(|| anyhow::anyhow!("No list titled {:?}", title))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let db = match cli.db {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate().context("Failed to migrate launch store")?;

    match cli.command {
        Commands::Lists => print_json(&db.get_all_lists()?)?,
        Commands::NewList { title } => {
            print_json(&db.create_list(CreateListInput { title })?)?
        }
        Commands::Launches {
            list,
            sort,
            unviewed,
            tags,
        } => {
            let mut spec = match list {
                Some(title) => FetchSpec::in_list(&require_list(&db, &title)?),
                None if unviewed => FetchSpec::unviewed(),
                None => FetchSpec::all(),
            };
            if let Some(sort) = sort {
                spec = spec.with_sort(sort.descriptors());
            }
            spec = spec.tagged_with(tags);
            print_json(&db.fetch_launches(&spec)?)?
        }
        Commands::NewLaunch {
            list,
            name,
            notes,
            launchpad,
            date,
            tags,
            attachment,
        } => {
            let list = require_list(&db, &list)?;
            let launch_date = date
                .map(|d| {
                    DateTime::parse_from_rfc3339(&d)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("Invalid launch date {:?}", d))
                })
                .transpose()?;
            let attachment = attachment
                .map(|path| {
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))
                })
                .transpose()?;

            let launch = db.create_launch(&CreateLaunchInput {
                name,
                notes,
                launch_date,
                launchpad,
                attachment,
                tag_titles: parse_tag_titles(&tags),
                list_id: list.id,
            })?;
            print_json(&db.get_launch_detail(launch.id)?)?
        }
        Commands::Tags { list } => {
            let list = require_list(&db, &list)?;
            print_json(&db.tags_in_list(list.id)?)?
        }
        Commands::View { id } => print_json(&db.mark_viewed(id)?)?,
        Commands::ImportFeed {
            file,
            favorite_into,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records: Vec<ExternalLaunch> =
                serde_json::from_str(&content).context("Failed to decode feed")?;

            if let Some(title) = favorite_into {
                let list = require_list(&db, &title)?;
                for record in &records {
                    db.list_launch(list.id, FavoriteTarget::External(record))?;
                }
            }

            print_json(&db.overlay_feed(records)?)?
        }
    }

    Ok(())
}
