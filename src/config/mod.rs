//! Run configuration, built once in `main` and borrowed by every component.
//!
//! Credentials come from CLI flags first, then `config.json`, then an
//! interactive prompt. Anything the user had to type (or pass as flags) is
//! written back to `config.json` so the next run is non-interactive.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PipelineError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
pub const DEFAULT_USER_AGENT_FILE: &str = "ua.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

const LOGIN_PATH: &str = "/member/login_new.php";
const COURSE_ID_PARAM: &str = "lp";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Local files the run reads and writes.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    pub cookies: PathBuf,
    pub user_agent: PathBuf,
    pub output_root: PathBuf,
}

impl Default for LocalFiles {
    fn default() -> Self {
        Self {
            cookies: PathBuf::from(DEFAULT_COOKIES_FILE),
            user_agent: PathBuf::from(DEFAULT_USER_AGENT_FILE),
            output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    /// URL of the lesson the user started from; carries the `lp` course id.
    pub course_url: Url,
    /// `scheme://host[:port]` of the course site, no trailing slash.
    pub origin: String,
    pub course_id: String,
    pub files: LocalFiles,
}

impl RunConfig {
    /// Validates the starting lesson URL and derives origin and course id from it.
    pub fn new(credentials: Credentials, course_url: &str, files: LocalFiles) -> Result<Self> {
        let course_url = Url::parse(course_url.trim()).map_err(|e| {
            PipelineError::InvalidCourseUrl {
                url: course_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        if course_url
            .path_segments()
            .and_then(|mut segments| segments.next())
            == Some("lesson-library")
        {
            return Err(PipelineError::InvalidCourseUrl {
                url: course_url.to_string(),
                reason: "this is the course contents page, open the first lesson and use its URL"
                    .to_string(),
            });
        }

        let course_id = course_id_from_url(&course_url).ok_or_else(|| {
            PipelineError::InvalidCourseUrl {
                url: course_url.to_string(),
                reason: format!("missing numeric `{COURSE_ID_PARAM}` query parameter"),
            }
        })?;

        let origin = course_url.origin().ascii_serialization();
        if origin == "null" {
            return Err(PipelineError::InvalidCourseUrl {
                url: course_url.to_string(),
                reason: "URL has no host".to_string(),
            });
        }

        Ok(Self {
            credentials,
            course_url,
            origin,
            course_id,
            files,
        })
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| PipelineError::Parse(format!("origin: {e}")))
    }

    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}{LOGIN_PATH}", self.origin)
    }

    /// `<output root>/course_<id>`
    #[must_use]
    pub fn course_dir(&self) -> PathBuf {
        self.files
            .output_root
            .join(format!("course_{}", self.course_id))
    }
}

fn course_id_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == COURSE_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
}

/// Reads the browser user agent the site expects. A missing or empty file is fatal.
pub fn load_user_agent(path: &Path) -> Result<String> {
    let hint = "create it with the User-Agent string of your browser \
                (see https://dnschecker.org/user-agent-info.php)";
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::ConfigMissing {
                path: path.to_path_buf(),
                hint,
            }
        } else {
            PipelineError::io(path, e)
        }
    })?;

    let user_agent = raw.trim();
    if user_agent.is_empty() {
        return Err(PipelineError::ConfigMissing {
            path: path.to_path_buf(),
            hint,
        });
    }
    Ok(user_agent.to_string())
}

/// Loads stored credentials. Absent or unreadable files yield `None`.
pub fn load_stored_credentials(path: &Path) -> Option<Credentials> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error loading config");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error loading config");
            None
        }
    }
}

/// Persists credentials; failures are logged and otherwise ignored.
pub fn save_credentials(path: &Path, credentials: &Credentials) {
    let saved = serde_json::to_string_pretty(credentials)
        .map_err(std::io::Error::other)
        .and_then(|json| std::fs::write(path, json));
    match saved {
        Ok(()) => info!(path = %path.display(), "Credentials saved"),
        Err(e) => warn!(path = %path.display(), error = %e, "Error saving config"),
    }
}

/// Flags, then the config file, then the prompt.
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
    config_path: &Path,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> std::io::Result<Credentials> {
    if let (Some(username), Some(password)) = (username, password) {
        let credentials = Credentials { username, password };
        save_credentials(config_path, &credentials);
        return Ok(credentials);
    }

    if let Some(credentials) = load_stored_credentials(config_path) {
        debug!(username = %credentials.username, "Using stored credentials");
        return Ok(credentials);
    }

    let credentials = Credentials {
        username: prompt(input, output, "Username (email): ")?,
        password: prompt(input, output, "Password: ")?,
    };
    save_credentials(config_path, &credentials);
    Ok(credentials)
}

pub fn prompt(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
) -> std::io::Result<String> {
    write!(output, "{message}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
