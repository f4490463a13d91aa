use std::fmt::Display;

use crate::bsky::{types::FeedPost, BskyError, Destination};

/// How many of the account's latest posts count as already published.
pub const RECENT_POSTS: u8 = 20;

/// Why a post was not created. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    Empty,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => f.write_str("duplicate"),
            Self::Empty => f.write_str("empty"),
        }
    }
}

/// Rejects blank text and exact repeats of any post in `recent`.
pub fn check(candidate: &str, recent: &[FeedPost]) -> Option<SkipReason> {
    if candidate.trim().is_empty() {
        return Some(SkipReason::Empty);
    }
    recent
        .iter()
        .any(|p| p.text == candidate)
        .then_some(SkipReason::Duplicate)
}

/// [`check`] against a fresh read of the account's feed.
pub async fn guard<D: Destination + ?Sized>(
    dest: &D,
    candidate: &str,
) -> Result<Option<SkipReason>, BskyError> {
    if candidate.trim().is_empty() {
        return Ok(Some(SkipReason::Empty));
    }
    let recent = dest.recent_posts(RECENT_POSTS).await?;
    Ok(check(candidate, &recent))
}
