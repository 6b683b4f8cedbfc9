//! Smartmarks CLI
//!
//! Terminal front end for the bookmark view:
//! - List, add and delete bookmarks
//! - Sign in and out
//! - Watch the list update live
//!
//! # Configuration
//!
//! Read from `--config`, else the default locations (see
//! [`smartmarks::config`]). Environment variables override the file;
//! `RUST_LOG` overrides the log level.

use clap::{Parser, Subcommand};
use smartmarks::backend::{ChangeFeed, RealtimeClient, SupabaseClient};
use smartmarks::config::{generate_default_config, Config};
use smartmarks::session_store::SessionStore;
use smartmarks::view::{render, BookmarkView, Services};
use smartmarks::BookmarkId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for change notifications after a mutation
const CONVERGE_WINDOW: Duration = Duration::from_millis(1500);

/// How long to wait for stray events on read-only commands
const QUIET_WINDOW: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "smartmarks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Smart Bookmark Manager")]
#[command(long_about = "Smart Bookmark Manager keeps a private, live-updating list of your bookmarks.\nSign in once, then add, list and delete bookmarks from the terminal.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List your bookmarks (default)
    List,

    /// Add a bookmark
    Add {
        /// Title shown in the list
        title: String,
        /// URL; must start with http
        url: String,
    },

    /// Delete a bookmark by id
    Delete {
        /// Bookmark id as shown by `list`
        id: String,
    },

    /// Show who is signed in
    Whoami,

    /// Sign in with the configured OAuth provider
    Login {
        /// Access token returned by the provider redirect
        #[arg(long)]
        token: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Keep the list on screen and update it live until Ctrl-C
    Watch,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    smartmarks::logging::init(&config.logging);

    let store = SessionStore::new(config.session_path());
    let command = cli.command.unwrap_or(Commands::List);

    match command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }

        Commands::Login { token: Some(token) } => {
            store.save(&token)?;
            println!("Session stored at {}", store.path().display());

            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle_quiet(QUIET_WINDOW).await;
            println!("{}", render(view.state()));
            view.unmount().await;
        }

        Commands::Login { token: None } => {
            let mut view = build_view(&config, &store)?;
            view.login().await;
            view.settle().await;

            match view.state().redirect() {
                Some(redirect) => {
                    println!("Open this link to sign in with {}:", redirect.provider);
                    println!("  {}", redirect.url);
                    println!();
                    println!("Then run: smartmarks login --token <access_token>");
                }
                None => println!("{}", render(view.state())),
            }
        }

        Commands::Logout => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle().await;
            view.logout().await;
            view.settle().await;
            store.clear()?;
            println!("{}", render(view.state()));
            view.unmount().await;
        }

        Commands::Whoami => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle().await;
            match view.state().session().identity() {
                Some(identity) => println!("Logged in as {} ({})", identity.display_name(), identity.id),
                None => println!("Not signed in"),
            }
            view.unmount().await;
        }

        Commands::List => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle_quiet(QUIET_WINDOW).await;
            println!("{}", render(view.state()));
            view.unmount().await;
        }

        Commands::Add { title, url } => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle().await;
            view.set_draft(title, url).await;
            view.add().await;
            view.settle_quiet(CONVERGE_WINDOW).await;
            println!("{}", render(view.state()));
            view.unmount().await;
        }

        Commands::Delete { id } => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;
            view.settle().await;
            view.delete(BookmarkId::new(id)).await;
            view.settle_quiet(CONVERGE_WINDOW).await;
            println!("{}", render(view.state()));
            view.unmount().await;
        }

        Commands::Watch => {
            let mut view = build_view(&config, &store)?;
            view.mount().await;

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            };

            view.run_until(shutdown, |state| {
                // Clear screen, cursor home
                print!("\x1b[2J\x1b[H{}", render(state));
            })
            .await;
        }
    }

    Ok(())
}

/// Wire the view to the configured backend, carrying the stored session
fn build_view(
    config: &Config,
    store: &SessionStore,
) -> Result<BookmarkView, Box<dyn std::error::Error>> {
    let token = store.access_token();

    let rest = Arc::new(match &token {
        Some(token) => SupabaseClient::with_access_token(config.supabase_config(), token.clone())?,
        None => SupabaseClient::new(config.supabase_config())?,
    });
    let changes: Arc<dyn ChangeFeed> = Arc::new(RealtimeClient::new(config.channel_config(), token));

    tracing::debug!(url = %config.backend.url, "Backend configured");

    let services = Services::new(rest.clone(), rest, changes);
    Ok(BookmarkView::new(services, config.view_options()))
}
