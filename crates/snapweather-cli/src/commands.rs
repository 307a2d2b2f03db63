//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::pin::pin;

use anyhow::{bail, Context, Result};
use futures::stream::{self, Stream, StreamExt};
use tracing::{info, warn};

use snapweather_core::auth::signup::validate_password;
use snapweather_core::pictures::client::DEFAULT_MEDIA_TYPE;
use snapweather_core::config::{TokenExpiryEndpoint, TokenStoreKind};
use snapweather_core::{
    Config, FetchError, Picture, PictureUpload, SessionFault, SessionManager, SignupError, SignupFlow,
};

use crate::prompt;

/// Wrong codes accepted before the flow gives up
const MAX_CODE_ATTEMPTS: usize = 3;

/// Update the saved config file with the given settings
pub fn configure(
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    token_endpoint: Option<String>,
    token_store: Option<String>,
) -> Result<()> {
    let mut config = Config::load_file()?;
    apply_settings(&mut config, base_url, timeout_secs, token_endpoint, token_store)?;

    let path = config.save()?;
    info!(path = %path.display(), "Config saved");
    println!("Saved {}", path.display());
    Ok(())
}

fn apply_settings(
    config: &mut Config,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    token_endpoint: Option<String>,
    token_store: Option<String>,
) -> Result<()> {
    if let Some(url) = base_url {
        config.base_url = Some(url.trim().to_string());
        config.base_url()?;
    }
    if let Some(secs) = timeout_secs {
        if secs == 0 {
            bail!("Timeout must be at least one second");
        }
        config.request_timeout_secs = secs;
    }
    if let Some(endpoint) = token_endpoint {
        config.token_expiry_endpoint = endpoint.parse::<TokenExpiryEndpoint>()?;
    }
    if let Some(store) = token_store {
        config.token_store = store.parse::<TokenStoreKind>()?;
    }
    Ok(())
}

pub async fn signup(session: &SessionManager, email: &str) -> Result<()> {
    let mut flow = session.begin_signup();
    flow.create_account(email).await?;
    println!("Account created.");

    let password = finish_flow(flow).await?;
    session.login(email, &password).await?;
    println!("Logged in. Pick a username with `snapweather set-username <name>`.");
    Ok(())
}

pub async fn reset_password(session: &SessionManager, email: &str) -> Result<()> {
    let flow = session.begin_password_reset(email)?;
    let password = finish_flow(flow).await?;
    session.login(email, &password).await?;
    println!("Password changed, you are logged in.");
    Ok(())
}

/// Request a code, then set a password with it. Returns the new password.
async fn finish_flow(mut flow: SignupFlow) -> Result<String> {
    flow.request_temporary_code().await?;
    println!(
        "A {}-digit code was sent to {}.",
        snapweather_core::auth::signup::TEMPORARY_CODE_LENGTH,
        flow.email().unwrap_or("your address")
    );

    let password = prompt::new_password()?;
    validate_password(&password)?;

    let mut attempts = 0;
    loop {
        let code = prompt::line("Code (r to resend): ")?;
        if code.eq_ignore_ascii_case("r") {
            flow.resend_temporary_code().await?;
            println!("A new code is on its way.");
            continue;
        }

        attempts += 1;
        match flow.set_password(&code, &password).await {
            Ok(()) => return Ok(password),
            Err(SignupError::InvalidCode) if attempts < MAX_CODE_ATTEMPTS => {
                println!("That code is not valid, try again.");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn login(session: &SessionManager, email: &str) -> Result<()> {
    let password = prompt::password("Password: ")?;
    session.login(email, &password).await?;

    let profile = session.profile().fetch_profile().await?;
    match profile.username {
        Some(name) => println!("Logged in as {}.", name),
        None => println!(
            "Logged in as {}. Pick a username with `snapweather set-username <name>`.",
            profile.email
        ),
    }
    Ok(())
}

pub async fn logout(session: &SessionManager) -> Result<()> {
    session.logout().await;
    println!("Logged out.");
    Ok(())
}

pub async fn expire_token(session: &SessionManager) -> Result<()> {
    session.expire_token().await?;
    println!("Token revoked on the server. Logged out.");
    Ok(())
}

pub async fn whoami(session: &SessionManager) -> Result<()> {
    if !session.has_token().await {
        println!("Not logged in.");
        return Ok(());
    }

    let profile = session.profile().fetch_profile().await?;
    println!("Email:    {}", profile.email);
    println!(
        "Username: {}",
        profile.username.as_deref().unwrap_or("(not set)")
    );
    Ok(())
}

pub async fn set_username(session: &SessionManager, name: &str) -> Result<()> {
    session.profile().set_username(name).await?;
    println!("Username set to {}.", name);
    Ok(())
}

fn describe(picture: &Picture) -> String {
    let weather = &picture.weather;
    format!(
        "{}  {}  by {}  {}: {}, feels like {}°C  ({}, {})",
        picture.id(),
        picture.date_display(),
        picture.author.username,
        weather.city,
        weather.description,
        weather.felt_temperature,
        picture.latitude,
        picture.longitude
    )
}

pub async fn list_pictures(session: &SessionManager, json: bool) -> Result<()> {
    let pictures = session.pictures().list_pictures().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pictures)?);
        return Ok(());
    }
    if pictures.is_empty() {
        println!("No pictures yet.");
        return Ok(());
    }
    for picture in &pictures {
        println!("{}", describe(picture));
    }
    Ok(())
}

fn save_picture(output: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let path = output.join(filename);
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub async fn download(session: &SessionManager, filename: &str, output: &Path) -> Result<()> {
    let bytes = session.pictures().fetch_picture_buffer(filename).await?;
    let path = save_picture(output, filename, &bytes)?;
    println!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub async fn download_all(session: &SessionManager, output: &Path, concurrency: usize) -> Result<()> {
    let client = session.pictures();
    let pictures = client.list_pictures().await?;
    let total = pictures.len();
    info!(total, concurrency, "Downloading all pictures");

    let downloads = stream::iter(pictures.into_iter().map(|p| p.filename))
        .map(|filename| {
            let client = client.clone();
            async move {
                let result = client.fetch_picture_buffer(&filename).await;
                (filename, result)
            }
        })
        .buffer_unordered(concurrency.max(1));

    save_as_completed(downloads, output, total).await
}

/// Write each image as soon as it arrives, so at most the in-flight buffers
/// are held at once. A session fault stops everything; other failures are
/// counted and reported at the end.
async fn save_as_completed(
    downloads: impl Stream<Item = (String, Result<Vec<u8>, FetchError>)>,
    output: &Path,
    total: usize,
) -> Result<()> {
    let mut downloads = pin!(downloads);
    let mut failed = 0;
    while let Some((filename, result)) = downloads.next().await {
        match result {
            Ok(bytes) => {
                let path = save_picture(output, &filename, &bytes)?;
                println!("Saved {}", path.display());
            }
            Err(e) if e.invalidates_session() => return Err(e.into()),
            Err(e) => {
                warn!(%filename, error = %e, "Download failed");
                eprintln!("Failed to download {}: {}", filename, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} downloads failed", failed, total);
    }
    println!("Downloaded {} pictures.", total);
    Ok(())
}

/// Media type for an image file, from its extension
fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

pub async fn upload(
    session: &SessionManager,
    path: &Path,
    latitude: f64,
    longitude: f64,
    media_type: Option<String>,
) -> Result<()> {
    let image =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let media_type = media_type.unwrap_or_else(|| media_type_for(path).to_string());
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("picture")
        .to_string();

    let upload =
        PictureUpload::heic(image, latitude, longitude).with_media_type(media_type, filename);
    session.pictures().upload(upload).await?;
    println!("Uploaded {}.", path.display());
    Ok(())
}
