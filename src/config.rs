use std::fmt::Display;

use serde::Deserialize;

pub const DEFAULT_VIDEO_SERVICE: &str = "https://video.bsky.app";

#[derive(Deserialize)]
pub struct Config {
    pub destination: DestinationAccount,
    pub origin: OriginAccount,

    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_langs")]
    pub langs: Vec<String>,
    /// Image used for link cards whose preview is missing or too large.
    pub fallback_card_image: String,

    #[serde(default)]
    pub normalize: NormalizeRules,
}

#[derive(Deserialize)]
pub struct DestinationAccount {
    pub service: String,
    #[serde(default = "default_video_service")]
    pub video_service: String,
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct OriginAccount {
    pub api_url: String,
    pub account_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u8,
}

/// Text rewrites applied to origin content after markup is stripped.
#[derive(Deserialize, Default, Clone)]
pub struct NormalizeRules {
    #[serde(default)]
    pub strip: Vec<String>,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweet_notice: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// Represents an account ID written either as [`u64`] or [`String`].
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Snowflake {
    Number(u64),
    String(String),
}

fn default_langs() -> Vec<String> {
    vec!["en".to_owned()]
}
fn default_video_service() -> String {
    DEFAULT_VIDEO_SERVICE.to_owned()
}
fn default_limit() -> u8 {
    15
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(v) => write!(f, "{v}"),
        }
    }
}
