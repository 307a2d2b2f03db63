//! SnapWeather command-line client.
//!
//! Sign up, log in, pick a username, then browse, download and upload
//! weather-tagged pictures. The session token is kept between runs in the
//! configured token store (the OS keychain by default).

mod commands;
mod prompt;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapweather_core::{
    AuthError, Config, FetchError, ProfileError, SessionFault, SessionManager, UploadError,
};

/// Downloads running at once for `download --all`
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "snapweather", author, version, about, long_about = None)]
struct Cli {
    /// API origin, overrides the config file and SNAPWEATHER_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true, env = "SNAPWEATHER_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save settings to the config file (use the global --base-url for the API origin)
    Configure {
        /// Request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Token expiry endpoint: token or account
        #[arg(long)]
        token_endpoint: Option<String>,

        /// Where the session token is kept: keyring, file or memory
        #[arg(long)]
        token_store: Option<String>,
    },

    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands that talk to the API
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Create an account and set its password
    Signup { email: String },

    /// Set a new password using a code sent by email
    ResetPassword { email: String },

    /// Log in and remember the session
    Login { email: String },

    /// Forget the saved session on this machine
    Logout,

    /// Invalidate the current token on the server, then log out
    ExpireToken,

    /// Show the signed-in account
    Whoami,

    /// Choose the public username shown on your pictures
    SetUsername { name: String },

    /// List every picture
    Pictures {
        /// Print the raw list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download one picture, or all of them with --all
    Download {
        #[arg(required_unless_present = "all")]
        filename: Option<String>,

        #[arg(long, conflicts_with = "filename")]
        all: bool,

        /// Directory to write images into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_DOWNLOAD_CONCURRENCY)]
        concurrency: usize,
    },

    /// Upload an image taken at the given coordinates
    Upload {
        path: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,

        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,

        /// Defaults to a type guessed from the file extension
        #[arg(long)]
        media_type: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). The returned guard must be
/// held until exit so buffered file output is flushed.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

/// True when the failure means the saved session is gone
fn is_session_fault(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<AuthError>() {
        return e.invalidates_session();
    }
    if let Some(e) = err.downcast_ref::<ProfileError>() {
        return e.invalidates_session();
    }
    if let Some(e) = err.downcast_ref::<FetchError>() {
        return e.invalidates_session();
    }
    if let Some(e) = err.downcast_ref::<UploadError>() {
        return e.invalidates_session();
    }
    false
}

async fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Command::Configure {
            timeout_secs,
            token_endpoint,
            token_store,
        } => {
            return commands::configure(cli.base_url, timeout_secs, token_endpoint, token_store);
        }
        Command::Session(command) => command,
    };

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.base_url = Some(url);
    }
    debug!(?config, "Configuration loaded");

    let session = SessionManager::from_config(&config)?;

    match command {
        SessionCommand::Signup { email } => commands::signup(&session, &email).await,
        SessionCommand::ResetPassword { email } => {
            commands::reset_password(&session, &email).await
        }
        SessionCommand::Login { email } => commands::login(&session, &email).await,
        SessionCommand::Logout => commands::logout(&session).await,
        SessionCommand::ExpireToken => commands::expire_token(&session).await,
        SessionCommand::Whoami => commands::whoami(&session).await,
        SessionCommand::SetUsername { name } => commands::set_username(&session, &name).await,
        SessionCommand::Pictures { json } => commands::list_pictures(&session, json).await,
        SessionCommand::Download {
            filename,
            all,
            output,
            concurrency,
        } => match filename {
            Some(filename) if !all => commands::download(&session, &filename, &output).await,
            _ => commands::download_all(&session, &output, concurrency).await,
        },
        SessionCommand::Upload {
            path,
            latitude,
            longitude,
            media_type,
        } => commands::upload(&session, &path, latitude, longitude, media_type).await,
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = match init_tracing(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };
    info!("SnapWeather CLI starting");

    if let Err(e) = run(cli).await {
        if is_session_fault(&e) {
            eprintln!("Session expired. Please log in again.");
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}
