//! Course run: authenticate, enumerate, then walk the lessons one at a time.
//!
//! Progress lives only on disk. A lesson directory with anything in it counts
//! as done, so a run can be restarted at any point and continues where the
//! filesystem says it stopped.

pub mod pacing;

use std::path::Path;

use scraper::Html;
use tracing::{info, instrument, warn};

use crate::auth::establish_session;
use crate::config::RunConfig;
use crate::download::{DownloadOutcome, Downloader};
use crate::error::{PipelineError, Result};
use crate::lessons::{
    LessonListSource, LessonRef, PathwayContextSource, enumerate_lessons, padding_width,
    starting_position,
};
use crate::media;
use crate::site::{SiteClient, has_captcha};

pub use pacing::{NoPacing, Pacing, RandomPacing};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lessons_total: usize,
    /// Lessons ahead of the supplied start URL; never visited this run.
    pub left_before_start: usize,
    /// 1-based number of the first lesson that still needed work.
    pub resumed_from: Option<usize>,
    pub processed: usize,
    pub skipped: usize,
    pub assets_downloaded: usize,
    pub assets_existing: usize,
    pub assets_failed: usize,
}

/// Logs in (or reuses saved cookies) and downloads the course.
pub async fn run_course(config: &RunConfig, pacing: Box<dyn Pacing>) -> Result<RunSummary> {
    let client = establish_session(config).await?;
    CoursePipeline::new(config, client)
        .with_pacing(pacing)
        .run()
        .await
}

pub struct CoursePipeline<'a> {
    config: &'a RunConfig,
    client: SiteClient,
    source: Box<dyn LessonListSource>,
    pacing: Box<dyn Pacing>,
}

impl<'a> CoursePipeline<'a> {
    #[must_use]
    pub fn new(config: &'a RunConfig, client: SiteClient) -> Self {
        Self {
            config,
            client,
            source: Box::new(PathwayContextSource),
            pacing: Box::new(RandomPacing::default()),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: Box<dyn LessonListSource>) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Box<dyn Pacing>) -> Self {
        self.pacing = pacing;
        self
    }

    /// Stops at the first lesson that fails; lessons already on disk stay there.
    #[instrument(skip_all, fields(course = %self.config.course_id))]
    pub async fn run(&self) -> Result<RunSummary> {
        let urls =
            enumerate_lessons(&self.client, &self.config.course_url, self.source.as_ref()).await?;
        if urls.is_empty() {
            return Err(PipelineError::NotFound("no lesson URLs found".to_string()));
        }

        let lessons = LessonRef::number(urls);
        let width = padding_width(lessons.len());
        let course_dir = self.config.course_dir();
        tokio::fs::create_dir_all(&course_dir)
            .await
            .map_err(|e| PipelineError::io(&course_dir, e))?;
        let downloader = Downloader::new(self.client.clone(), &course_dir, width);

        let start = starting_position(&lessons, &self.config.course_url);
        if start > 0 {
            info!(
                lesson = start + 1,
                total = lessons.len(),
                left_out = start,
                "Starting from supplied lesson, earlier lessons are left out even if not downloaded"
            );
        }

        let mut summary = RunSummary {
            lessons_total: lessons.len(),
            left_before_start: start,
            ..RunSummary::default()
        };

        for (position, lesson) in lessons.iter().enumerate().skip(start) {
            let dir = downloader.lesson_dir(lesson.index);
            if has_entries(&dir).await? {
                info!(lesson = lesson.index, "Skipping lesson (already downloaded)");
                summary.skipped += 1;
                continue;
            }
            if summary.resumed_from.is_none() {
                summary.resumed_from = Some(lesson.index);
                if lesson.index > 1 {
                    info!(lesson = lesson.index, total = lessons.len(), "Resuming");
                }
            }

            self.process_lesson(lesson, width, &downloader, &mut summary)
                .await
                .map_err(|e| PipelineError::lesson(lesson.index, e))?;
            summary.processed += 1;

            if position + 1 < lessons.len() {
                let delay = self.pacing.next_delay();
                if !delay.is_zero() {
                    info!(seconds = delay.as_secs(), "Pausing before next lesson");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            downloaded = summary.assets_downloaded,
            failed = summary.assets_failed,
            "Finished downloading the course"
        );
        Ok(summary)
    }

    async fn process_lesson(
        &self,
        lesson: &LessonRef,
        width: usize,
        downloader: &Downloader,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let body = self.client.get_page(lesson.url.as_str()).await?;
        let lesson_media = {
            let page = Html::parse_document(&body);
            if has_captcha(&page) {
                return Err(PipelineError::CaptchaBlocked {
                    url: lesson.url.to_string(),
                });
            }
            media::extract(&page, &self.config.origin)?
        };

        info!(
            lesson = %lesson.dir_name(width),
            title = %lesson_media.title,
            assets = lesson_media.assets.len(),
            "Processing lesson"
        );

        for asset in &lesson_media.assets {
            match downloader
                .download(&asset.url, &asset.filename, lesson.index)
                .await?
            {
                DownloadOutcome::Downloaded(_) => summary.assets_downloaded += 1,
                DownloadOutcome::Skipped(_) => summary.assets_existing += 1,
                DownloadOutcome::Failed { .. } => summary.assets_failed += 1,
            }
        }
        if lesson_media.assets.is_empty() {
            warn!(lesson = lesson.index, "No media found on lesson page");
        }
        Ok(())
    }
}

/// Missing directories count as empty.
async fn has_entries(dir: &Path) -> Result<bool> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };
    let first = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(dir, e))?;
    Ok(first.is_some())
}
