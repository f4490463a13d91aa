use tracing::debug;

use crate::bsky::{
    types::{PostRef, ReplyRefs},
    BskyError, Destination,
};

/// Root of the thread currently being written.
///
/// The destination hands out identifiers only once a post is accepted, so
/// the parent of a reply is learned by reading back the account's latest
/// post. Posts of one thread must therefore be created one after another.
#[derive(Debug, Default)]
pub struct ThreadState {
    root: Option<PostRef>,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&PostRef> {
        self.root.as_ref()
    }

    /// Forgets the open thread before a top-level post.
    pub fn begin_root(&mut self) {
        self.root = None;
    }

    /// Reply references for the next post of the open thread.
    ///
    /// The latest post becomes the parent, and the root too if none is set.
    /// `None` when the account has no posts to reply to.
    pub async fn resolve_parent<D: Destination + ?Sized>(
        &mut self,
        dest: &D,
    ) -> Result<Option<ReplyRefs>, BskyError> {
        let Some(latest) = dest.recent_posts(1).await?.into_iter().next() else {
            return Ok(None);
        };
        let parent = latest.post_ref();
        let root = self.root.get_or_insert_with(|| parent.clone()).clone();
        debug!(root = %root.uri, parent = %parent.uri, "resolved reply target");

        Ok(Some(ReplyRefs { root, parent }))
    }
}
