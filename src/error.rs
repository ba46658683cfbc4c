use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything that can stop a course run.
///
/// Components return these and never exit the process themselves; `main`
/// decides what is fatal. Asset downloads absorb their own failures and
/// report them through [`crate::download::DownloadOutcome`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("captcha required at {url}")]
    CaptchaBlocked { url: String },

    #[error("HTTP {status} from {url}")]
    HttpError { url: String, status: u16 },

    #[error("{0}")]
    NotFound(String),

    #[error("missing required file {path}: {hint}")]
    ConfigMissing { path: PathBuf, hint: &'static str },

    #[error("invalid course URL {url}: {reason}")]
    InvalidCourseUrl { url: String, reason: String },

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lesson {index} failed: {source}")]
    Lesson {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn lesson(index: usize, source: PipelineError) -> Self {
        Self::Lesson {
            index,
            source: Box::new(source),
        }
    }

    /// True when the site served a CAPTCHA, directly or inside a lesson failure.
    #[must_use]
    pub fn is_captcha(&self) -> bool {
        match self {
            Self::CaptchaBlocked { .. } => true,
            Self::Lesson { source, .. } => source.is_captcha(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_error_wraps_captcha() {
        let err = PipelineError::lesson(
            4,
            PipelineError::CaptchaBlocked {
                url: "https://www.example.com/lesson/x".to_string(),
            },
        );
        assert!(err.is_captcha());
        assert!(err.to_string().starts_with("lesson 4 failed"));
    }

    #[test]
    fn test_http_error_display() {
        let err = PipelineError::HttpError {
            url: "https://www.example.com/".to_string(),
            status: 403,
        };
        assert_eq!(err.to_string(), "HTTP 403 from https://www.example.com/");
        assert!(!err.is_captcha());
    }
}
