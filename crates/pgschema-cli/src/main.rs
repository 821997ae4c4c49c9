mod config;
mod report;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use pgschema::{Database, DocumentOrder, Options};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};

/// Dependency ordering and diffing for declarative Postgres schema documents.
#[derive(Parser, Debug)]
#[command(name = "pgschema", version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print objects in creation order
    Order {
        file: PathBuf,
        /// Write a document in creation order instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// Show what each object depends on
    Deps {
        file: PathBuf,
        /// Only show this object, e.g. `shop.order`
        #[arg(long)]
        object: Option<String>,
    },
    /// Compute the migration turning CURRENT into TARGET
    Diff { current: PathBuf, target: PathBuf },
    /// Report calls with no matching overload and dependency cycles
    Check { file: PathBuf },
    /// Write FILE with its objects in the order REFERENCE lists them
    Merge {
        file: PathBuf,
        #[arg(long)]
        reference: PathBuf,
    },
    /// Write a document back out, grouped by schema
    Format {
        file: PathBuf,
        /// Keep the objects in the order they were read
        #[arg(long)]
        internal: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: pgschema::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to write document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no object named {0}")]
    UnknownObject(String),
    #[error("{0} problem(s) found")]
    Problems(usize),
}

fn main() {
    let cli = Cli::parse();

    let config = load_config();
    let log = config.as_ref().ok().and_then(|(c, _)| c.log.clone());
    init_logging(log.as_deref());

    let result = config.map_err(CliError::from).and_then(|(config, path)| {
        if let Some(path) = path {
            debug!(path = %path.display(), "using config");
        }
        run(cli, config.options())
    });

    if let Err(err) = result {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

/// The project config, or the defaults when there is none.
fn load_config() -> Result<(Config, Option<PathBuf>), ConfigError> {
    match config::load() {
        Ok((config, path)) => Ok((config, Some(path))),
        Err(ConfigError::NotFound) => Ok((Config::default(), None)),
        Err(err) => Err(err),
    }
}

fn init_logging(directive: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or("pgschema=info")));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn read(path: &Path, options: &Options) -> Result<Database, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let db = Database::from_json(&text, options.clone()).map_err(|source| CliError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        objects = db.objects().len(),
        schemas = db.schemas().count(),
        "loaded"
    );
    Ok(db)
}

fn run(cli: Cli, options: Options) -> Result<(), CliError> {
    let color = !cli.no_color;

    match cli.command {
        Commands::Order { file, json } => {
            let db = read(&file, &options)?;
            let ordering = db.order();
            if json {
                let document = db.document_of(ordering.objects);
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print!("{}", report::ordering(&db, &ordering, color));
            }
        }
        Commands::Deps { file, object } => {
            let db = read(&file, &options)?;
            let mut shown = 0;
            for (id, o) in db.iter() {
                if object.as_ref().is_some_and(|wanted| *wanted != o.ident()) {
                    continue;
                }
                print!("{}", report::dependencies(&db, id, color));
                shown += 1;
            }
            if let Some(object) = object
                && shown == 0
            {
                return Err(CliError::UnknownObject(object));
            }
        }
        Commands::Diff { current, target } => {
            let current = read(&current, &options)?;
            let target = read(&target, &options)?;
            let plan = current.diff(&target);
            info!(operations = plan.len(), "diff complete");
            print!("{}", report::plan(&plan, color));
        }
        Commands::Check { file } => {
            let db = read(&file, &options)?;
            let diagnostics = db.diagnostics();
            for (id, call) in &diagnostics {
                println!("{}", report::problem(&db.object(*id).ident(), call, color));
            }

            let ordering = db.order();
            for id in &ordering.forced {
                let message = "created before one of its dependencies (cycle)";
                println!("{}", report::problem(&db.object(*id).ident(), &message, color));
            }
            for id in &ordering.relaxed {
                debug!(object = %db.object(*id).ident(), "ordered past a same-named dependency");
            }

            let problems = diagnostics.len() + ordering.forced.len();
            if problems > 0 {
                return Err(CliError::Problems(problems));
            }
            println!(
                "{} objects in {} schemas, no problems found",
                db.objects().len(),
                db.schemas().count()
            );
        }
        Commands::Merge { file, reference } => {
            let db = read(&file, &options)?;
            let reference = read(&reference, &options)?;
            let document = db.document_of(db.merge_order(&reference));
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Commands::Format { file, internal } => {
            let db = read(&file, &options)?;
            let order = if internal {
                DocumentOrder::Internal
            } else {
                DocumentOrder::BySchema
            };
            println!("{}", serde_json::to_string_pretty(&db.to_document(order))?);
        }
    }

    Ok(())
}
