use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{NormalizeRules, Snowflake};

use super::{normalize::normalize, CardSlot, MediaSlot, SourceItem, VideoMeta, MEDIA_SLOTS};

pub struct MastodonClient {
    http: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Debug, Error)]
pub enum MastodonError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to decode statuses: {0}")]
    Scheme(#[from] serde_json::Error),
    #[error("API returned error {status}: {error}")]
    Server { status: u16, error: String },
}

#[derive(Deserialize)]
struct RawStatus {
    content: String,
    #[serde(default)]
    media_attachments: Vec<RawAttachment>,
    #[serde(default)]
    card: Option<RawCard>,
}
#[derive(Deserialize)]
struct RawAttachment {
    r#type: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    meta: Option<RawMeta>,
}
#[derive(Deserialize)]
struct RawMeta {
    #[serde(default)]
    original: Option<RawOriginal>,
}
#[derive(Deserialize)]
struct RawOriginal {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<f64>,
}
#[derive(Deserialize)]
struct RawCard {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image: Option<String>,
}
#[derive(Deserialize)]
struct RawError {
    error: String,
}

impl MastodonClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            token,
        }
    }

    /// Fetches the latest `limit` statuses of `account`, oldest first.
    pub async fn statuses(
        &self,
        account: &Snowflake,
        limit: u8,
        rules: &NormalizeRules,
    ) -> Result<Vec<SourceItem>, MastodonError> {
        let mut req = self
            .http
            .get(format!("{}/accounts/{account}/statuses", self.api_url))
            .query(&[
                ("limit", limit.to_string()),
                ("exclude_replies", "true".into()),
                ("exclude_reblogs", "true".into()),
            ]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let error = serde_json::from_str::<RawError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(MastodonError::Server {
                status: status.as_u16(),
                error,
            });
        }

        let raw: Vec<RawStatus> = serde_json::from_str(&body)?;
        debug!(count = raw.len(), %account, "fetched origin statuses");

        Ok(raw
            .into_iter()
            .rev() // api returns newest first
            .map(|s| into_item(s, rules))
            .collect())
    }
}

fn into_item(status: RawStatus, rules: &NormalizeRules) -> SourceItem {
    let card = status.card.map(|c| CardSlot {
        url: c.url,
        title: c.title,
        description: c.description,
        image_url: c.image,
    });

    let mut media: [Option<MediaSlot>; MEDIA_SLOTS] = Default::default();
    for (slot, attachment) in media
        .iter_mut()
        .zip(status.media_attachments.into_iter())
    {
        *slot = into_slot(attachment);
    }

    SourceItem {
        text: normalize(&status.content, card.as_ref().map(|c| c.url.as_str()), rules),
        media,
        card,
    }
}

fn into_slot(a: RawAttachment) -> Option<MediaSlot> {
    let url = a.url?;
    let video = match a.r#type.as_str() {
        "image" => None,
        "video" | "gifv" => {
            let original = a.meta.and_then(|m| m.original);
            Some(VideoMeta {
                width: original.as_ref().and_then(|o| o.width).unwrap_or_default(),
                height: original.as_ref().and_then(|o| o.height).unwrap_or_default(),
                duration_secs: original.and_then(|o| o.duration).unwrap_or_default(),
                thumbnail_url: a.preview_url,
            })
        }
        _ => return None,
    };

    Some(MediaSlot {
        url,
        alt_text: a.description,
        video,
    })
}
