//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bsky::types::{BlobRef, FeedPost, PostDraft, PostRef, UploadLimits};
use crate::bsky::{BskyError, Destination};
use crate::media::{Fetch, FetchError};

/// Destination that keeps its feed in memory.
///
/// Created posts are put on top of the feed, so reading the latest post
/// after a write behaves like the real service.
#[derive(Default)]
pub struct MockDestination {
    state: Mutex<State>,
    no_video_quota: bool,
    fail_uploads: bool,
    /// Zero-based post attempts that fail, with whether the failure is an auth error.
    fail_posts: HashMap<usize, bool>,
}

#[derive(Default)]
struct State {
    feed: Vec<FeedPost>,
    uploads: Vec<(usize, String)>,
    posts: Vec<PostDraft>,
    attempts: usize,
    limit_queries: usize,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed pre-filled with `texts`, most recent first.
    pub fn with_feed(texts: &[&str]) -> Self {
        let dest = Self::new();
        {
            let mut state = dest.state.lock().unwrap();
            state.feed = texts
                .iter()
                .enumerate()
                .map(|(i, text)| FeedPost {
                    text: (*text).to_owned(),
                    uri: format!("at://mock/old/{i}"),
                    cid: format!("old{i}"),
                })
                .collect();
        }
        dest
    }

    pub fn without_video_quota(mut self) -> Self {
        self.no_video_quota = true;
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn failing_post(mut self, attempt: usize, auth: bool) -> Self {
        self.fail_posts.insert(attempt, auth);
        self
    }

    pub fn posts(&self) -> Vec<PostDraft> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn uploads(&self) -> Vec<(usize, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn limit_queries(&self) -> usize {
        self.state.lock().unwrap().limit_queries
    }

    /// Reference the mock assigns to the `n`th accepted post.
    pub fn post_ref(n: usize) -> PostRef {
        PostRef {
            uri: format!("at://mock/post/{n}"),
            cid: format!("cid{n}"),
        }
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, BskyError> {
        if self.fail_uploads {
            return Err(BskyError::NoBlob);
        }
        let mut state = self.state.lock().unwrap();
        state.uploads.push((bytes.len(), mime.to_owned()));
        Ok(BlobRef::new(
            format!("blob{}", state.uploads.len()),
            mime,
            bytes.len() as u64,
        ))
    }

    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedPost>, BskyError> {
        let state = self.state.lock().unwrap();
        Ok(state.feed.iter().take(limit.into()).cloned().collect())
    }

    async fn upload_limits(&self) -> Result<UploadLimits, BskyError> {
        self.state.lock().unwrap().limit_queries += 1;
        Ok(UploadLimits {
            can_upload: !self.no_video_quota,
            remaining_daily_videos: None,
            message: None,
        })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef, BskyError> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.attempts;
        state.attempts += 1;

        match self.fail_posts.get(&attempt) {
            Some(true) => return Err(BskyError::Auth("ExpiredToken".into())),
            Some(false) => {
                return Err(BskyError::Server {
                    status: 500,
                    error: "InternalServerError".into(),
                    message: "boom".into(),
                })
            }
            None => {}
        }

        let post = Self::post_ref(state.posts.len());
        state.posts.push(draft.clone());
        state.feed.insert(
            0,
            FeedPost {
                text: draft.text.clone(),
                uri: post.uri.clone(),
                cid: post.cid.clone(),
            },
        );
        Ok(post)
    }
}

/// Fetcher serving canned bytes; unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    files: Arc<HashMap<String, Vec<u8>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        Arc::make_mut(&mut self.files).insert(url.to_owned(), bytes);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetched.lock().unwrap().push(url.to_owned());
        self.files.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_owned(),
            status: 404,
        })
    }
}
