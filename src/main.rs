use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use newsline::api::{
    ApiClient, Credentials, FeedKey, FeedType, ImageUpload, ProfileUpdate, Registration,
    TimeFilter,
};
use newsline::cache::FeedCache;
use newsline::config::Config;
use newsline::display;
use newsline::feed::{FeedController, PageOutcome};
use newsline::session::{AuthPhase, Session, TokenJar};

const LINE_WIDTH: usize = 100;

/// Get the config directory path (~/.config/newsline/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsline"))
}

#[derive(Parser, Debug)]
#[command(name = "newsline", about = "Command-line client for the news aggregation backend")]
struct Args {
    /// Config file (default: ~/.config/newsline/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
        /// Profile picture to upload
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
    },
    /// Show the session state, refreshing silently if needed
    Status,
    /// End the session
    Logout,
    /// List a feed
    Feed {
        /// latest, hottest or liked
        #[arg(default_value = "latest")]
        feed_type: FeedType,
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// week, month, year or all (hottest only)
        #[arg(long)]
        time_filter: Option<TimeFilter>,
    },
    /// Toggle the like on an article
    Like { id: i64 },
    /// Show the profile
    Profile,
    /// Update name, email and optionally the password
    ProfileUpdate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
}

fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides();

    let session_path = config
        .session_file
        .clone()
        .unwrap_or_else(|| config_dir.join("session.toml"));
    if let Some(parent) = session_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let backend = config.backend().context("Backend is not configured")?;
    let tokens = Arc::new(TokenJar::persistent(&session_path));
    let client = ApiClient::new(backend, tokens).context("Failed to build HTTP client")?;

    match args.command {
        Command::Login { email, password } => {
            let credentials = Credentials {
                email,
                password: read_password(password)?,
            };
            client
                .login(&credentials)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Logged in.");
        }
        Command::Register {
            name,
            email,
            password,
            image,
        } => {
            let image = match image {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "image".to_string());
                    Some(ImageUpload { file_name, bytes })
                }
                None => None,
            };
            let message = client
                .register(Registration {
                    name,
                    email,
                    password: read_password(password)?,
                    image,
                })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", display::clean(&message));
        }
        Command::Status => {
            let session = Session::new(client);
            let state = session.check_auth().await;
            let label = match state.phase() {
                AuthPhase::Loading => "loading",
                AuthPhase::Authenticated => "authenticated",
                AuthPhase::RefreshAvailable => "signed out (refresh token held, log in again)",
                AuthPhase::SignedOut => "signed out",
            };
            println!("Session: {label}");
        }
        Command::Logout => {
            Session::new(client).logout().await;
            println!("Logged out.");
        }
        Command::Feed {
            feed_type,
            pages,
            time_filter,
        } => {
            if time_filter.is_some() && !feed_type.has_time_filter() {
                anyhow::bail!("--time-filter only applies to the hottest feed");
            }
            let session = Session::new(client);
            if feed_type.requires_auth() && !session.check_auth().await.is_authenticated {
                anyhow::bail!("The {feed_type} feed requires login");
            }
            let client = session.backend();

            let mut feed = FeedController::new(
                FeedCache::new(config.cache_max_age()),
                config.page_sizes(),
            );
            let key = FeedKey::new(feed_type, time_filter);

            let mut outcome = feed.load(client, key).await;
            for _ in 1..pages {
                if !matches!(
                    outcome,
                    PageOutcome::Replaced { .. } | PageOutcome::Appended { .. }
                ) {
                    break;
                }
                match feed.load_more_from(client).await {
                    Some(next) => outcome = next,
                    None => break,
                }
            }

            for article in feed.items() {
                println!("{}", display::article_line(article, LINE_WIDTH));
            }
            if let Some(error) = feed.error() {
                anyhow::bail!("{error}");
            }
            if feed.items().is_empty() {
                println!("No articles.");
            } else if !feed.has_more() {
                println!("-- end of feed --");
            }
        }
        Command::Like { id } => {
            let outcome = client
                .handle_like(id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let verb = if outcome.liked { "Liked" } else { "Unliked" };
            println!("{verb} #{id} ({} likes)", outcome.likes);
        }
        Command::Profile => {
            let profile = client
                .profile()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", display::profile_block(&profile));
        }
        Command::ProfileUpdate {
            name,
            email,
            password,
        } => {
            let profile = client
                .update_profile(&ProfileUpdate {
                    name,
                    email,
                    password,
                })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", display::profile_block(&profile));
        }
    }

    Ok(())
}
