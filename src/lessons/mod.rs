use scraper::Html;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::site::{SiteClient, has_captcha, selector};

/// Extracts the ordered lesson URLs of a course from its lesson page.
///
/// The order returned is the canonical lesson order used for numbering and
/// resumption.
pub trait LessonListSource: Send + Sync {
    fn lesson_urls(&self, page: &Html, origin: &Url) -> Result<Vec<Url>>;
}

/// Reads the `data-collection-entities` JSON embedded in the
/// `js-pathway-context-data` element of a lesson page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathwayContextSource;

const PATHWAY_CLASS: &str = "js-pathway-context-data";
const ENTITIES_ATTR: &str = "data-collection-entities";
const LESSON_PREFIX: &str = "/lesson/";

#[derive(Debug, Deserialize)]
struct CollectionEntity {
    #[serde(default)]
    url: Option<String>,
}

impl LessonListSource for PathwayContextSource {
    fn lesson_urls(&self, page: &Html, origin: &Url) -> Result<Vec<Url>> {
        let mut urls = Vec::new();
        for element in page.select(&selector("div")) {
            if !element.value().classes().any(|class| class == PATHWAY_CLASS) {
                continue;
            }
            let Some(payload) = element.value().attr(ENTITIES_ATTR) else {
                continue;
            };
            let entities: Vec<CollectionEntity> = serde_json::from_str(payload)
                .map_err(|e| PipelineError::Parse(format!("{ENTITIES_ATTR}: {e}")))?;

            for path in entities.into_iter().filter_map(|entity| entity.url) {
                if !path.starts_with(LESSON_PREFIX) {
                    continue;
                }
                let url = origin
                    .join(&path)
                    .map_err(|e| PipelineError::Parse(format!("lesson path {path}: {e}")))?;
                debug!(%url, "lesson");
                urls.push(url);
            }
        }
        Ok(urls)
    }
}

/// Fetches the course page and lists its lessons.
///
/// An empty list is returned as-is; deciding that it is fatal is the caller's job.
#[instrument(skip_all, fields(course = %course_url))]
pub async fn enumerate_lessons(
    client: &SiteClient,
    course_url: &Url,
    source: &dyn LessonListSource,
) -> Result<Vec<Url>> {
    let body = client.get_page(course_url.as_str()).await?;
    let page = Html::parse_document(&body);
    if has_captcha(&page) {
        return Err(PipelineError::CaptchaBlocked {
            url: course_url.to_string(),
        });
    }
    let urls = source.lesson_urls(&page, client.origin())?;
    info!(lessons = urls.len(), "Lesson URLs listed");
    Ok(urls)
}

/// One lesson of the course, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonRef {
    pub index: usize,
    pub url: Url,
}

impl LessonRef {
    #[must_use]
    pub fn number(urls: Vec<Url>) -> Vec<Self> {
        urls.into_iter()
            .enumerate()
            .map(|(i, url)| Self { index: i + 1, url })
            .collect()
    }

    #[must_use]
    pub fn dir_name(&self, width: usize) -> String {
        lesson_dir_name(self.index, width)
    }
}

/// Digits needed for the largest lesson number.
#[must_use]
pub fn padding_width(total: usize) -> usize {
    total.max(1).to_string().len()
}

#[must_use]
pub fn lesson_dir_name(index: usize, width: usize) -> String {
    format!("{index:0width$}")
}

/// Position of the lesson the user started from, compared by path.
#[must_use]
pub fn starting_position(lessons: &[LessonRef], start: &Url) -> usize {
    let wanted = start.path().trim_end_matches('/');
    lessons
        .iter()
        .position(|lesson| lesson.url.path().trim_end_matches('/') == wanted)
        .unwrap_or(0)
}
