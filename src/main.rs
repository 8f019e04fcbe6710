use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scopeward::config::Config;
use scopeward::db::Database;
use scopeward::models::{RecordKind, RuleCategory};
use scopeward::observer::{ScopeChange, ScopeObserver};
use scopeward::session::Session;
use scopeward::tree::render_tree;

#[derive(Parser)]
#[command(name = "scopeward")]
#[command(about = "Manage the testing scope of an assessment session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new session file
    Init {
        path: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show or change rule lists
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
    /// Record a request against the session
    Record {
        path: PathBuf,
        uri: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Mark the record as discovered by the crawler
        #[arg(long)]
        crawled: bool,
    },
    /// Check whether resources are in scope
    Check {
        path: PathBuf,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the resource tree with scope markers
    Tree {
        path: PathBuf,
        /// List only in-scope nodes
        #[arg(long)]
        in_scope: bool,
    },
    /// Purge the session's recorded history
    Discard { path: PathBuf },
}

#[derive(Subcommand)]
enum RulesAction {
    /// Print rules, all categories unless one is given
    Get {
        path: PathBuf,
        #[arg(value_parser = parse_category)]
        category: Option<RuleCategory>,
    },
    /// Replace a category's patterns
    Set {
        path: PathBuf,
        #[arg(value_parser = parse_category)]
        category: RuleCategory,
        patterns: Vec<String>,
    },
    /// Append one pattern to a category
    Add {
        path: PathBuf,
        #[arg(value_parser = parse_category)]
        category: RuleCategory,
        pattern: String,
    },
}

fn parse_category(s: &str) -> Result<RuleCategory, String> {
    RuleCategory::from_str(s).ok_or_else(|| {
        let names: Vec<_> = RuleCategory::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{}', expected one of: {}", s, names.join(", "))
    })
}

/// Logs scope changes; the CLI has no other consumers.
struct LogObserver;

impl ScopeObserver for LogObserver {
    fn scope_changed(&self, change: &ScopeChange) {
        tracing::info!("Scope changed for {} nodes", change.changed_nodes.len());
    }

    fn exclusions_changed(&self, category: RuleCategory, patterns: &[String]) {
        tracing::info!("{} now has {} patterns", category, patterns.len());
    }
}

/// Initialize tracing with output to stderr so stdout stays scriptable
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "scopeward=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn location(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn new_session(config: &Config) -> anyhow::Result<Session> {
    let store = Database::open_memory().context("Failed to create scratch store")?;
    Ok(Session::builder(Arc::new(store))
        .config(config.clone())
        .observer(Arc::new(LogObserver))
        .build())
}

async fn open_session(path: &Path, config: &Config) -> anyhow::Result<Session> {
    let session = new_session(config)?;
    let (tx, rx) = tokio::sync::oneshot::channel();

    session
        .open_async(location(path), move |_, err| {
            let _ = tx.send(err);
        })
        .await?;

    if let Some(e) = rx.await? {
        return Err(e).with_context(|| format!("Failed to open {}", path.display()));
    }
    Ok(session)
}

async fn save_session(session: &Session, path: &Path) -> anyhow::Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    session
        .save_async(location(path), move |err| {
            let _ = tx.send(err);
        })
        .await?;

    if let Some(e) = rx.await? {
        return Err(e).with_context(|| format!("Failed to save {}", path.display()));
    }
    Ok(())
}

fn print_rules(session: &Session, category: RuleCategory) {
    println!("{}:", category);
    for pattern in session.get_rules(category) {
        println!("  {}", pattern);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::load();

    match cli.command {
        Commands::Init {
            path,
            name,
            description,
        } => {
            let session = new_session(&config)?;
            if let Some(name) = name {
                session.set_name(name)?;
            }
            if let Some(description) = description {
                session.set_description(description)?;
            }
            save_session(&session, &path).await?;
            println!("Created session {} at {}", session.id(), path.display());
        }
        Commands::Rules { action } => match action {
            RulesAction::Get { path, category } => {
                let session = open_session(&path, &config).await?;
                match category {
                    Some(category) => print_rules(&session, category),
                    None => RuleCategory::ALL
                        .into_iter()
                        .for_each(|c| print_rules(&session, c)),
                }
            }
            RulesAction::Set {
                path,
                category,
                patterns,
            } => {
                let session = open_session(&path, &config).await?;
                if session.set_rules(category, &patterns)? {
                    session.flush()?;
                    save_session(&session, &path).await?;
                } else {
                    println!("Rules unchanged");
                }
            }
            RulesAction::Add {
                path,
                category,
                pattern,
            } => {
                let session = open_session(&path, &config).await?;
                if session.add_rule(category, &pattern)? {
                    session.flush()?;
                    save_session(&session, &path).await?;
                }
            }
        },
        Commands::Record {
            path,
            uri,
            method,
            crawled,
        } => {
            let session = open_session(&path, &config).await?;
            let kind = if crawled {
                RecordKind::Crawled
            } else {
                RecordKind::Manual
            };
            let record = session.add_record(kind, &method, &uri)?;
            save_session(&session, &path).await?;
            let verdict = if session.is_record_in_scope(record.id) {
                "in scope"
            } else {
                "out of scope"
            };
            println!("Recorded #{} {} {} ({})", record.id, method, uri, verdict);
        }
        Commands::Check { path, names } => {
            let session = open_session(&path, &config).await?;
            for name in names {
                let verdict = if session.is_in_scope(&name) { "in" } else { "out" };
                println!("{}\t{}", verdict, name);
            }
        }
        Commands::Tree { path, in_scope } => {
            let session = open_session(&path, &config).await?;
            if in_scope {
                for node in session.collect_in_scope() {
                    println!("{}", node.hierarchic_name);
                }
            } else {
                print!("{}", render_tree(&session.tree().read()));
            }
        }
        Commands::Discard { path } => {
            let session = open_session(&path, &config).await?;
            session.discard();
            println!("Discarded history for session {}", session.id());
        }
    }

    Ok(())
}
