use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    bsky::{
        types::{PostDraft, PostRef},
        BskyError, Destination,
    },
    chunk,
    dedup::{self, SkipReason},
    limits::PlatformLimits,
    media::{Fetch, MediaError, MediaResolver},
    sources::SourceItem,
    thread::ThreadState,
};

/// Posted once when a whole batch looked like repeats, which more likely
/// means deduplication is broken than that nothing was new.
pub const DIAGNOSTIC_TEXT: &str =
    "ERROR: Repost detection glitch. Every item of the latest batch was rejected as a duplicate.";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Destination(#[from] BskyError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl PublishError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Destination(e) => e.is_fatal(),
            Self::Media(e) => e.is_fatal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Published(PostRef),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostRole {
    Root,
    Reply,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Accepted posts, counting every chunk of a thread.
    pub published: usize,
    /// Items whose every post was rejected as a duplicate.
    pub duplicate_items: usize,
    pub empty_items: usize,
    pub failed_items: usize,
    pub diagnostic_posted: bool,
}

#[derive(Default)]
struct ItemReport {
    published: usize,
    skipped: Vec<SkipReason>,
}

impl ItemReport {
    fn record(&mut self, outcome: &PostOutcome) {
        match outcome {
            PostOutcome::Published(_) => self.published += 1,
            PostOutcome::Skipped(reason) => self.skipped.push(*reason),
        }
    }

    fn all(&self, reason: SkipReason) -> bool {
        self.published == 0
            && !self.skipped.is_empty()
            && self.skipped.iter().all(|r| *r == reason)
    }
}

pub struct Publisher<'a, D: ?Sized, F> {
    dest: &'a D,
    media: MediaResolver<F>,
    limits: PlatformLimits,
    langs: Vec<String>,
}

impl<'a, D: Destination + ?Sized, F: Fetch> Publisher<'a, D, F> {
    pub fn new(dest: &'a D, media: MediaResolver<F>, langs: Vec<String>) -> Self {
        Self {
            dest,
            media,
            limits: PlatformLimits::default(),
            langs,
        }
    }

    /// Publishes `batch`, oldest item first.
    ///
    /// A failing item is logged and skipped; only fatal destination errors
    /// end the run early.
    pub async fn run(&self, batch: &[SourceItem]) -> Result<RunSummary, PublishError> {
        let mut thread = ThreadState::new();
        let mut summary = RunSummary::default();

        for (idx, item) in batch.iter().enumerate() {
            let mut report = ItemReport::default();
            let res = self.publish_item(&mut thread, item, &mut report).await;
            summary.published += report.published;

            match res {
                Ok(()) if report.all(SkipReason::Duplicate) => summary.duplicate_items += 1,
                Ok(()) if report.all(SkipReason::Empty) => summary.empty_items += 1,
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(item = idx, published = report.published, error = %e, "item failed");
                    summary.failed_items += 1;
                }
            }
        }

        if !batch.is_empty() && summary.duplicate_items == batch.len() {
            warn!(items = batch.len(), "every item was a duplicate");
            match self
                .publish_post(&mut thread, DIAGNOSTIC_TEXT, None, PostRole::Root)
                .await
            {
                Ok(outcome) => {
                    summary.diagnostic_posted = matches!(outcome, PostOutcome::Published(_))
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(error = %e, "failed to post diagnostic"),
            }
        }

        info!(
            published = summary.published,
            duplicates = summary.duplicate_items,
            empty = summary.empty_items,
            failed = summary.failed_items,
            diagnostic = summary.diagnostic_posted,
            "batch done"
        );
        Ok(summary)
    }

    async fn publish_item(
        &self,
        thread: &mut ThreadState,
        item: &SourceItem,
        report: &mut ItemReport,
    ) -> Result<(), PublishError> {
        if item.text.chars().count() <= self.limits.max_text_length {
            let outcome = self
                .publish_post(thread, &item.text, Some(item), PostRole::Root)
                .await?;
            report.record(&outcome);
            return Ok(());
        }

        let chunks = chunk::split_marked(
            &item.text,
            self.limits.max_text_length,
            self.limits.max_chunk_text_length,
        );
        for chunk in &chunks {
            let (media, role) = if chunk.index == 0 {
                (Some(item), PostRole::Root)
            } else {
                (None, PostRole::Reply)
            };
            let outcome = self
                .publish_post(thread, &chunk.marked(), media, role)
                .await?;
            report.record(&outcome);
        }
        Ok(())
    }

    /// Creates one post unless its text is blank or was posted recently.
    ///
    /// A root post closes the open thread even when it is skipped, so the
    /// replies that follow never attach to an earlier item. `media` is
    /// resolved only after the duplicate check passed, so skipped posts
    /// upload nothing.
    async fn publish_post(
        &self,
        thread: &mut ThreadState,
        text: &str,
        media: Option<&SourceItem>,
        role: PostRole,
    ) -> Result<PostOutcome, PublishError> {
        if role == PostRole::Root {
            thread.begin_root();
        }
        if let Some(reason) = dedup::guard(self.dest, text).await? {
            info!(%reason, text, "skipping post");
            return Ok(PostOutcome::Skipped(reason));
        }

        let embed = match media {
            Some(item) => self
                .media
                .resolve(self.dest, item, self.limits)
                .await?
                .into_embed(),
            None => None,
        };

        let reply = match role {
            PostRole::Root => None,
            PostRole::Reply => thread.resolve_parent(self.dest).await?,
        };

        let draft = PostDraft {
            text: text.to_owned(),
            facets: self.dest.facets(text).await?,
            embed,
            reply,
            langs: self.langs.clone(),
        };
        let post = self.dest.create_post(&draft).await?;
        info!(
            uri = %post.uri,
            root = ?thread.root().map(|r| r.uri.as_str()),
            "published"
        );

        Ok(PostOutcome::Published(post))
    }
}
