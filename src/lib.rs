//! Downloads complete language courses (audio, video and PDF lesson notes)
//! from the Innovative Language site family: japanesepod101.com,
//! spanishpod101.com, chineseclass101.com and their siblings.
//!
//! - [`auth`] reuses saved cookies or logs in
//! - [`lessons`] lists the lessons of a course
//! - [`media`] finds the files on a lesson page
//! - [`download`] saves them under one directory per lesson
//! - [`pipeline`] ties it together with resumption and pacing

pub mod auth;
pub mod config;
pub mod download;
pub mod error;
pub mod lessons;
pub mod media;
pub mod pipeline;
pub mod site;

pub use config::{Credentials, LocalFiles, RunConfig};
pub use download::{DownloadOutcome, Downloader};
pub use error::{PipelineError, Result};
pub use lessons::{LessonListSource, LessonRef, PathwayContextSource};
pub use media::{MediaAsset, MediaKind};
pub use pipeline::{CoursePipeline, NoPacing, Pacing, RandomPacing, RunSummary, run_course};
pub use site::SiteClient;
