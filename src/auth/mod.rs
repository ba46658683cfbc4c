//! Session establishment: reuse persisted cookies when they still work,
//! otherwise log in and persist the fresh cookies.

pub mod cookies;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use scraper::Html;
use tracing::{info, instrument, warn};

use crate::config::{RunConfig, load_user_agent};
use crate::error::{PipelineError, Result};
use crate::site::{SiteClient, ensure_success, has_captcha, requires_login, set_cookie_headers};

pub use cookies::{CookieError, CookieLine, read_cookie_file, write_cookie_file};

/// Returns a logged-in client for the course site.
///
/// The user agent file is required before any request is made.
#[instrument(skip_all, fields(origin = %config.origin))]
pub async fn establish_session(config: &RunConfig) -> Result<SiteClient> {
    let user_agent = load_user_agent(&config.files.user_agent)?;
    let origin = config.origin_url()?;

    if let Some(jar) = load_cookie_jar(&config.files.cookies) {
        let client = SiteClient::new(&user_agent, jar, origin.clone())?;
        match cookies_still_valid(&client, config).await {
            Ok(true) => {
                info!("Authenticated using saved cookies");
                return Ok(client);
            }
            Ok(false) => info!("Cookies expired, logging in again"),
            Err(PipelineError::Transport { url, source }) => {
                warn!(url, error = %source, "Could not test saved cookies, logging in again");
            }
            Err(e) => return Err(e),
        }
    }

    let client = SiteClient::new(&user_agent, Arc::new(Jar::default()), origin)?;
    login(&client, config).await?;
    Ok(client)
}

fn load_cookie_jar(path: &Path) -> Option<Arc<Jar>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No cookie file found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot open cookie file");
            return None;
        }
    };
    match read_cookie_file(BufReader::new(file)) {
        Ok(cookies) => {
            info!(path = %path.display(), count = cookies.len(), "Cookies loaded");
            Some(cookies::jar_from_cookies(&cookies))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring cookie file");
            None
        }
    }
}

/// Probes the course page; a visible sign-in control means the cookies are stale.
async fn cookies_still_valid(client: &SiteClient, config: &RunConfig) -> Result<bool> {
    let body = client.get_page(config.course_url.as_str()).await?;
    let page = Html::parse_document(&body);
    Ok(!requires_login(&page))
}

async fn login(client: &SiteClient, config: &RunConfig) -> Result<()> {
    let login_url = config.login_url();
    info!(url = %login_url, "Trying to login");

    let form = [
        ("amember_login", config.credentials.username.as_str()),
        ("amember_pass", config.credentials.password.as_str()),
    ];
    let response = match client.post_form(&login_url, &form).await {
        Ok(response) => response,
        Err(e) => return Err(PipelineError::LoginFailed(e.to_string())),
    };
    let response = ensure_success(response)?;
    let set_cookie = set_cookie_headers(&response);
    let body = response
        .text()
        .await
        .map_err(|e| PipelineError::LoginFailed(e.to_string()))?;

    if has_captcha(&Html::parse_document(&body)) {
        return Err(PipelineError::CaptchaBlocked { url: login_url });
    }
    info!(username = %config.credentials.username, "Successfully logged in");

    let cookies =
        cookies::collect_session_cookies(client.origin(), &set_cookie, &client.cookie_pairs());
    save_cookies(&config.files.cookies, &cookies);
    Ok(())
}

/// Persisting is best effort: the live session works either way.
fn save_cookies(path: &Path, cookies: &[CookieLine]) {
    let saved = File::create(path).and_then(|file| write_cookie_file(BufWriter::new(file), cookies));
    match saved {
        Ok(()) => info!(path = %path.display(), count = cookies.len(), "Cookies saved"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to save cookies"),
    }
}
