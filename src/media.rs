use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    bsky::{
        types::{AspectRatio, BlobRef, Embed, External, ImageEmbed},
        BskyError, Destination,
    },
    limits::PlatformLimits,
    sources::{has_video_extension, CardSlot, MediaSlot, SourceItem, VideoMeta},
};

pub const QUOTA_FALLBACK_ALT: &str =
    "The daily video upload limit has been reached. This is the thumbnail of the video instead.";
pub const TOO_LONG_FALLBACK_ALT: &str =
    "The video is too long to be posted. This is the thumbnail of the video instead.";

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
const DEFAULT_VIDEO_MIME: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Destination(#[from] BskyError),
}

impl MediaError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Destination(e) if e.is_fatal())
    }
}

/// Source of raw attachment bytes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Default)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: res.status().as_u16(),
            });
        }
        Ok(res.bytes().await?.to_vec())
    }
}

/// How one item's media is represented on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    Video {
        blob: BlobRef,
        aspect_ratio: Option<AspectRatio>,
    },
    ImageSet(Vec<ImageEmbed>),
    LinkCard(External),
    None,
}

impl PublishDecision {
    pub fn into_embed(self) -> Option<Embed> {
        match self {
            Self::Video { blob, aspect_ratio } => Some(Embed::Video {
                video: blob,
                aspect_ratio,
            }),
            Self::ImageSet(images) => Some(Embed::Images { images }),
            Self::LinkCard(external) => Some(Embed::External { external }),
            Self::None => None,
        }
    }
}

pub struct MediaResolver<F> {
    fetch: F,
    fallback_image: String,
}

impl<F: Fetch> MediaResolver<F> {
    pub fn new(fetch: F, fallback_image: impl Into<String>) -> Self {
        Self {
            fetch,
            fallback_image: fallback_image.into(),
        }
    }

    /// Picks and uploads the embed for `item`.
    ///
    /// An uploaded video decides the embed alone. Otherwise images win over
    /// the link card, which is only built when slot 0 carries no media.
    pub async fn resolve<D: Destination + ?Sized>(
        &self,
        dest: &D,
        item: &SourceItem,
        limits: PlatformLimits,
    ) -> Result<PublishDecision, MediaError> {
        let mut slots = item.media.clone();

        if let Some(first) = slots[0].as_ref().filter(|s| has_video_extension(&s.url)) {
            let limits = refresh_quota(dest, limits).await?;
            let meta = first.video.as_ref();
            // no declared duration leaves the check to the destination
            let too_long = meta.is_some_and(|m| m.duration_secs >= limits.max_video_duration_secs);

            if limits.can_upload_video && !too_long {
                return self.video(dest, &first.url, meta).await;
            }

            let alt = if limits.can_upload_video {
                TOO_LONG_FALLBACK_ALT
            } else {
                QUOTA_FALLBACK_ALT
            };
            warn!(url = %first.url, reason = alt, "posting video thumbnail");
            let thumbnail = meta
                .and_then(|m| m.thumbnail_url.as_deref())
                .map(|thumb| MediaSlot::image(thumb, Some(alt)));
            slots[0] = thumbnail;
        }

        let card = match (&item.card, &slots[0]) {
            (Some(card), None) => Some(self.link_card(dest, card, &limits).await?),
            _ => None,
        };

        let mut images = Vec::new();
        for slot in slots.iter().flatten() {
            if let Some(image) = self.image(dest, slot, &limits).await? {
                images.push(image);
            }
        }

        Ok(match (images.is_empty(), card) {
            (false, _) => PublishDecision::ImageSet(images),
            (true, Some(card)) => PublishDecision::LinkCard(card),
            (true, None) => PublishDecision::None,
        })
    }

    async fn video<D: Destination + ?Sized>(
        &self,
        dest: &D,
        url: &str,
        meta: Option<&VideoMeta>,
    ) -> Result<PublishDecision, MediaError> {
        let bytes = self.fetch_bytes(url).await?;
        let mime = sniff(&bytes, DEFAULT_VIDEO_MIME);
        let blob = dest.upload_blob(bytes, mime).await?;

        Ok(PublishDecision::Video {
            blob,
            aspect_ratio: meta.and_then(|m| AspectRatio::new(m.width, m.height)),
        })
    }

    async fn link_card<D: Destination + ?Sized>(
        &self,
        dest: &D,
        card: &CardSlot,
        limits: &PlatformLimits,
    ) -> Result<External, MediaError> {
        let preview = match card.image_url.as_deref() {
            Some(url) => match self.fetch_bytes(url).await {
                Ok(bytes) if bytes.len() <= limits.max_attachment_bytes => Some(bytes),
                Ok(bytes) => {
                    warn!(url, size = bytes.len(), "card preview too big, using fallback");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "card preview unavailable, using fallback");
                    None
                }
            },
            None => None,
        };

        let bytes = match preview {
            Some(bytes) => Some(bytes),
            None => match self.fetch_bytes(&self.fallback_image).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(error = %e, "fallback card image unavailable, posting card without thumbnail");
                    None
                }
            },
        };

        let thumb = match bytes {
            Some(bytes) => {
                let mime = sniff(&bytes, DEFAULT_IMAGE_MIME);
                Some(dest.upload_blob(bytes, mime).await?)
            }
            None => None,
        };

        Ok(External {
            uri: card.url.clone(),
            title: card.title.clone(),
            description: card.description.clone(),
            thumb,
        })
    }

    async fn image<D: Destination + ?Sized>(
        &self,
        dest: &D,
        slot: &MediaSlot,
        limits: &PlatformLimits,
    ) -> Result<Option<ImageEmbed>, MediaError> {
        if has_video_extension(&slot.url) {
            debug!(url = %slot.url, "video outside the first slot, dropping");
            return Ok(None);
        }

        let bytes = match self.fetch_bytes(&slot.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "dropping unavailable image");
                return Ok(None);
            }
        };
        if bytes.len() > limits.max_attachment_bytes {
            warn!(url = %slot.url, size = bytes.len(), "dropping oversized image");
            return Ok(None);
        }

        let mime = sniff(&bytes, DEFAULT_IMAGE_MIME);
        let image = dest.upload_blob(bytes, mime).await?;

        Ok(Some(ImageEmbed {
            image,
            alt: slot.alt_text.clone().unwrap_or_default(),
        }))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.fetch
            .fetch(url)
            .await
            .map_err(|source| MediaError::Fetch {
                url: url.to_owned(),
                source,
            })
    }
}

/// Current quota; a failed query counts as no quota unless it is fatal.
async fn refresh_quota<D: Destination + ?Sized>(
    dest: &D,
    limits: PlatformLimits,
) -> Result<PlatformLimits, MediaError> {
    match dest.upload_limits().await {
        Ok(quota) => {
            debug!(
                can_upload = quota.can_upload,
                remaining = ?quota.remaining_daily_videos,
                message = ?quota.message,
                "video quota"
            );
            Ok(limits.with_video_quota(quota.can_upload))
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            warn!(error = %e, "video quota unavailable");
            Ok(limits.with_video_quota(false))
        }
    }
}

fn sniff(bytes: &[u8], default: &'static str) -> &'static str {
    infer::get(bytes).map_or(default, |t| t.mime_type())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::testing::{MockDestination, MockFetcher};

    use super::*;

    const FALLBACK: &str = "https://cdn/fallback.jpg";
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn video_item(duration_secs: f64) -> SourceItem {
        let mut item = SourceItem::from_text("clip");
        item.media[0] = Some(MediaSlot {
            url: "https://m/v.mp4".into(),
            alt_text: None,
            video: Some(VideoMeta {
                width: 1920,
                height: 1080,
                duration_secs,
                thumbnail_url: Some("https://m/v.png".into()),
            }),
        });
        item.card = Some(CardSlot {
            url: "https://news/x".into(),
            title: "t".into(),
            description: "d".into(),
            image_url: None,
        });
        item
    }

    fn resolver(fetch: MockFetcher) -> MediaResolver<MockFetcher> {
        MediaResolver::new(fetch, FALLBACK)
    }

    #[tokio::test]
    async fn short_video_is_uploaded_with_aspect_ratio() {
        let dest = MockDestination::new();
        let fetch = MockFetcher::new().with("https://m/v.mp4", vec![0; 4_000_000]);

        let decision = resolver(fetch)
            .resolve(&dest, &video_item(12.0), PlatformLimits::default())
            .await
            .unwrap();

        let PublishDecision::Video { blob, aspect_ratio } = decision else {
            panic!("expected video");
        };
        assert_eq!(blob.mime_type, "video/mp4");
        assert_eq!(blob.size, 4_000_000);
        assert_eq!(aspect_ratio, AspectRatio::new(1920, 1080));
        assert_eq!(dest.uploads().len(), 1);
        assert_eq!(dest.limit_queries(), 1);
    }

    #[tokio::test]
    async fn long_video_falls_back_to_thumbnail() {
        let dest = MockDestination::new();
        let fetch = MockFetcher::new().with("https://m/v.png", PNG.to_vec());

        let decision = resolver(fetch)
            .resolve(&dest, &video_item(200.0), PlatformLimits::default())
            .await
            .unwrap();

        let PublishDecision::ImageSet(images) = decision else {
            panic!("expected thumbnail image");
        };
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].alt, TOO_LONG_FALLBACK_ALT);
        assert_eq!(images[0].image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn exhausted_quota_falls_back_to_thumbnail() {
        let dest = MockDestination::new().without_video_quota();
        let fetch = MockFetcher::new().with("https://m/v.png", PNG.to_vec());

        let decision = resolver(fetch.clone())
            .resolve(&dest, &video_item(12.0), PlatformLimits::default())
            .await
            .unwrap();

        let PublishDecision::ImageSet(images) = decision else {
            panic!("expected thumbnail image");
        };
        assert_eq!(images[0].alt, QUOTA_FALLBACK_ALT);
        assert!(!fetch.fetched().contains(&"https://m/v.mp4".to_owned()));
    }

    #[tokio::test]
    async fn oversized_card_preview_uses_fallback_image() {
        let dest = MockDestination::new();
        let fetch = MockFetcher::new()
            .with("https://news/x.jpg", vec![0; 1_000_001])
            .with(FALLBACK, PNG.to_vec());
        let mut item = SourceItem::from_text("read");
        item.card = Some(CardSlot {
            url: "https://news/x".into(),
            title: "Title".into(),
            description: "Desc".into(),
            image_url: Some("https://news/x.jpg".into()),
        });

        let decision = resolver(fetch)
            .resolve(&dest, &item, PlatformLimits::default())
            .await
            .unwrap();

        let PublishDecision::LinkCard(card) = decision else {
            panic!("expected link card");
        };
        assert_eq!(card.uri, "https://news/x");
        assert_eq!(card.title, "Title");
        assert_eq!(card.thumb.unwrap().size, PNG.len() as u64);
        assert_eq!(dest.uploads(), vec![(PNG.len(), "image/png".to_owned())]);
    }

    #[tokio::test]
    async fn images_win_over_card_and_oversized_slots_are_dropped() {
        let dest = MockDestination::new();
        let fetch = MockFetcher::new()
            .with("https://m/a.png", PNG.to_vec())
            .with("https://m/big.png", vec![0; 2_000_000])
            .with("https://m/c.png", PNG.to_vec());
        let mut item = SourceItem::from_text("pics");
        item.media = [
            Some(MediaSlot::image("https://m/a.png", Some("first"))),
            Some(MediaSlot::image("https://m/big.png", None)),
            None,
            Some(MediaSlot::image("https://m/c.png", None)),
        ];
        item.card = Some(CardSlot {
            url: "https://news/x".into(),
            title: String::new(),
            description: String::new(),
            image_url: None,
        });

        let decision = resolver(fetch)
            .resolve(&dest, &item, PlatformLimits::default())
            .await
            .unwrap();

        let PublishDecision::ImageSet(images) = decision else {
            panic!("expected images");
        };
        let alts: Vec<&str> = images.iter().map(|i| i.alt.as_str()).collect();
        assert_eq!(alts, vec!["first", ""]);
        assert_eq!(dest.uploads().len(), 2);
    }

    #[tokio::test]
    async fn upload_failure_fails_the_item() {
        let dest = MockDestination::new().failing_uploads();
        let fetch = MockFetcher::new().with("https://m/a.png", PNG.to_vec());
        let mut item = SourceItem::from_text("pic");
        item.media[0] = Some(MediaSlot::image("https://m/a.png", None));

        let err = resolver(fetch)
            .resolve(&dest, &item, PlatformLimits::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Destination(BskyError::NoBlob)));
    }

    #[tokio::test]
    async fn text_only_item_needs_no_network() {
        let dest = MockDestination::new();
        let fetch = MockFetcher::new();

        let decision = resolver(fetch.clone())
            .resolve(&dest, &SourceItem::from_text("plain"), PlatformLimits::default())
            .await
            .unwrap();

        assert_eq!(decision, PublishDecision::None);
        assert!(fetch.fetched().is_empty());
        assert_eq!(dest.limit_queries(), 0);
    }
}
