//! Finds the downloadable audio, video and PDF files of a lesson page.

use std::fmt;

use scraper::{ElementRef, Html};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::site::{element_text, selector};

const TRACK_ATTRS: &[&str] = &["data-trackurl", "data-url"];
const HREF_ATTRS: &[&str] = &["href"];
const AUDIO_EXT: &str = ".mp3";
const VIDEO_EXTS: &[&str] = &[".mp4", ".m4v"];
const PDF_EXT: &str = ".pdf";
const MAX_PDFS: usize = 2;
const INVALID_TITLE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Dialogue,
    Review,
    MainLesson,
    FullEpisode,
    LessonNotes,
    LessonTranscript,
    Pdf,
}

impl MediaKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Dialogue => "Dialogue",
            Self::Review => "Review",
            Self::MainLesson => "Main Lesson",
            Self::FullEpisode => "Full Episode",
            Self::LessonNotes => "Lesson Notes",
            Self::LessonTranscript => "Lesson Transcript",
            Self::Pdf => "PDF",
        }
    }

    /// Audio and video tracks are told apart by their file name.
    fn of_track(url: &str) -> Self {
        let file = url.rsplit('/').next().unwrap_or(url).to_lowercase();
        if file.contains("dialog") {
            Self::Dialogue
        } else if file.contains("review") {
            Self::Review
        } else {
            Self::MainLesson
        }
    }

    /// PDFs are told apart by their link text.
    fn of_pdf(text: &str) -> Self {
        if text.contains("Lesson Notes") {
            Self::LessonNotes
        } else if text.contains("Lesson Transcript") {
            Self::LessonTranscript
        } else {
            Self::Pdf
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub url: String,
    pub filename: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct LessonMedia {
    pub title: String,
    pub assets: Vec<MediaAsset>,
}

/// Title and assets of a lesson page.
pub fn extract(page: &Html, origin: &str) -> Result<LessonMedia> {
    let title = lesson_title(page)?;
    let assets = extract_assets(page, &title, origin);
    Ok(LessonMedia { title, assets })
}

/// Text of the page `<title>`, trimmed.
pub fn lesson_title(page: &Html) -> Result<String> {
    page.select(&selector("title"))
        .next()
        .map(|title| element_text(title).trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| PipelineError::Parse("lesson page has no title".to_string()))
}

/// Audio first, then the full episode, video and PDFs.
#[must_use]
pub fn extract_assets(page: &Html, title: &str, origin: &str) -> Vec<MediaAsset> {
    let mut assets = Vec::new();

    for audio in page.select(&selector("audio")) {
        let Some(url) = resolve_url(audio, TRACK_ATTRS, origin) else {
            continue;
        };
        if !url.ends_with(AUDIO_EXT) {
            continue;
        }
        assets.push(asset(url, title, MediaKind::of_track, AUDIO_EXT));
    }

    if let Some(url) = full_episode_url(page, origin) {
        assets.push(MediaAsset {
            filename: asset_filename(title, MediaKind::FullEpisode, AUDIO_EXT),
            url,
            kind: MediaKind::FullEpisode,
        });
    }

    for video in page.select(&selector("video")) {
        let Some(url) = resolve_url(video, TRACK_ATTRS, origin) else {
            continue;
        };
        let Some(ext) = VIDEO_EXTS.iter().find(|ext| url.ends_with(*ext)) else {
            continue;
        };
        assets.push(asset(url, title, MediaKind::of_track, ext));
    }

    let link_selector = selector("a[href]");
    let pdf_links = page
        .select(&link_selector)
        .filter(|link| link.value().attr("href").is_some_and(|h| h.contains(PDF_EXT)));
    for (position, link) in pdf_links.enumerate() {
        let text = element_text(link);
        if position >= MAX_PDFS || text.to_lowercase().contains("checklist") {
            debug!(text = text.trim(), "Skipping PDF");
            continue;
        }
        let Some(url) = resolve_url(link, HREF_ATTRS, origin) else {
            continue;
        };
        let kind = MediaKind::of_pdf(&text);
        assets.push(MediaAsset {
            filename: asset_filename(title, kind, PDF_EXT),
            url,
            kind,
        });
    }

    assets
}

fn asset(url: String, title: &str, classify: fn(&str) -> MediaKind, ext: &str) -> MediaAsset {
    let kind = classify(&url);
    MediaAsset {
        filename: asset_filename(title, kind, ext),
        url,
        kind,
    }
}

/// The first downloadable track link that is neither dialogue nor review.
fn full_episode_url(page: &Html, origin: &str) -> Option<String> {
    page.select(&selector("a[download][data-trackurl]"))
        .filter_map(|link| resolve_url(link, &["data-trackurl"], origin))
        .find(|url| {
            let lower = url.to_lowercase();
            lower.ends_with(AUDIO_EXT) && !lower.contains("dialogue") && !lower.contains("review")
        })
}

/// First present attribute wins; site-relative values get the origin prepended.
fn resolve_url(element: ElementRef<'_>, attrs: &[&str], origin: &str) -> Option<String> {
    let value = attrs.iter().find_map(|attr| element.value().attr(attr))?;
    if value.starts_with("http") {
        return Some(value.to_string());
    }
    if let Some(rest) = value.strip_prefix("//") {
        let scheme = origin.split("://").next().unwrap_or("https");
        return Some(format!("{scheme}://{rest}"));
    }
    Some(format!("{origin}{value}"))
}

#[must_use]
pub fn sanitize_title(title: &str) -> String {
    title.chars().filter(|c| !INVALID_TITLE_CHARS.contains(c)).collect()
}

/// `{title} - {kind}{ext}`
#[must_use]
pub fn asset_filename(title: &str, kind: MediaKind, ext: &str) -> String {
    format!("{} - {}{ext}", sanitize_title(title), kind.label())
}
