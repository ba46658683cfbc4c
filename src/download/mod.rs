use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::lessons::lesson_dir_name;
use crate::site::SiteClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    /// The file was already on disk; no request was made.
    Skipped(PathBuf),
    Failed { url: String, reason: String },
}

/// Saves lesson assets under `<course dir>/<padded lesson index>/`.
pub struct Downloader {
    client: SiteClient,
    course_dir: PathBuf,
    width: usize,
}

impl Downloader {
    #[must_use]
    pub fn new(client: SiteClient, course_dir: impl Into<PathBuf>, width: usize) -> Self {
        Self {
            client,
            course_dir: course_dir.into(),
            width,
        }
    }

    #[must_use]
    pub fn lesson_dir(&self, lesson_index: usize) -> PathBuf {
        self.course_dir.join(lesson_dir_name(lesson_index, self.width))
    }

    /// Fetches `url` into the lesson directory as `filename`.
    ///
    /// Only a failure to create the lesson directory is an error; HTTP and
    /// write failures come back as [`DownloadOutcome::Failed`].
    pub async fn download(
        &self,
        url: &str,
        filename: &str,
        lesson_index: usize,
    ) -> Result<DownloadOutcome> {
        let dir = self.lesson_dir(lesson_index);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::io(&dir, e))?;

        let path = dir.join(filename);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(file = filename, "Skipping (already exists)");
            return Ok(DownloadOutcome::Skipped(path));
        }

        match self.fetch(url, &path).await {
            Ok(()) => {
                info!(file = filename, dir = %dir_label(&dir), "Saved");
                Ok(DownloadOutcome::Downloaded(path))
            }
            Err(reason) => {
                warn!(file = filename, url, %reason, "Failed to save");
                Ok(DownloadOutcome::Failed {
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }

    async fn fetch(&self, url: &str, path: &Path) -> std::result::Result<(), String> {
        let response = self.client.get(url).await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        tokio::fs::write(path, &body)
            .await
            .map_err(|e| format!("write {}: {e}", path.display()))
    }
}

fn dir_label(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |name| name.to_string_lossy().into_owned())
}
