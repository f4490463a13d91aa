use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::types::{BlobRef, Facet, FeedPost, PostDraft, PostRef, UploadLimits};
use super::{BskyError, Destination};

/// Destination that reads through to `D` but never writes.
///
/// Uploads and posts are logged and answered with synthetic references, so
/// media resolution still fetches and measures every attachment.
pub struct DryRun<D> {
    inner: D,
    posts: AtomicUsize,
}

impl<D: Destination> DryRun<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            posts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<D: Destination> Destination for DryRun<D> {
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, BskyError> {
        info!(size = bytes.len(), mime, "dry run: skipping upload");
        Ok(BlobRef::new("dry-run", mime, bytes.len() as u64))
    }

    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedPost>, BskyError> {
        self.inner.recent_posts(limit).await
    }

    async fn upload_limits(&self) -> Result<UploadLimits, BskyError> {
        self.inner.upload_limits().await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef, BskyError> {
        let n = self.posts.fetch_add(1, Ordering::Relaxed);
        info!(
            text = %draft.text,
            embed = draft.embed.is_some(),
            reply = draft.reply.is_some(),
            "dry run: skipping post"
        );
        Ok(PostRef {
            uri: format!("at://dry-run/app.bsky.feed.post/{n}"),
            cid: "dry-run".to_owned(),
        })
    }

    async fn facets(&self, text: &str) -> Result<Vec<Facet>, BskyError> {
        self.inner.facets(text).await
    }
}
