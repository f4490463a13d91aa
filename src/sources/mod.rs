use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod framing;
pub mod mastodon;
pub mod normalize;

/// Number of positional media slots on an origin item.
pub const MEDIA_SLOTS: usize = 4;

/// Normalized origin post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Plain text. May be empty
    pub text: String,
    /// Positional media slots; `None` means no media in that slot.
    #[serde(default)]
    pub media: [Option<MediaSlot>; MEDIA_SLOTS],
    /// Link preview, used only when no media is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardSlot>,
}

/// Single media attachment of an origin post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSlot {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    /// Present for videos and animated GIFs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSlot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl SourceItem {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

impl MediaSlot {
    pub fn image(url: impl Into<String>, alt_text: Option<&str>) -> Self {
        Self {
            url: url.into(),
            alt_text: alt_text.map(str::to_owned),
            video: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchFileError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid structured batch: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid framed batch: {0}")]
    Framing(#[from] framing::FramingError),
}

/// Reads a batch saved to disk, oldest item first.
///
/// `.json` files hold a list of [`SourceItem`]s in posting order; anything
/// else is parsed as legacy framing.
pub fn read_batch(path: &Path) -> Result<Vec<SourceItem>, BatchFileError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    decode_batch(&content, is_json)
}

fn decode_batch(content: &str, is_json: bool) -> Result<Vec<SourceItem>, BatchFileError> {
    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(framing::parse_batch(content.trim_end_matches(['\n', '\r']))?)
    }
}

/// Whether an URL points at a video container the destination accepts.
///
/// Only the path is inspected, so `clip.mp4?sig=...` still counts.
pub fn has_video_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mp4" | "m4v" | "mov" | "webm"
    )
}
