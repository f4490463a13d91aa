use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod dry_run;
pub mod facets;
pub mod types;

use types::{BlobRef, Embed, Facet, FeedPost, PostDraft, PostRef, ReplyRefs, UploadLimits};

const POST_COLLECTION: &str = "app.bsky.feed.post";
const UPLOAD_LIMITS_NSID: &str = "app.bsky.video.getUploadLimits";
/// Lifetime of the service token used against the video service.
const SERVICE_AUTH_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Error)]
pub enum BskyError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Scheme(#[from] serde_json::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("API returned error {status} {error}: {message}")]
    Server {
        status: u16,
        error: String,
        message: String,
    },
    #[error("upload returned no blob")]
    NoBlob,
}

impl BskyError {
    /// Errors that make every further call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Authenticated handle to the destination platform.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, BskyError>;

    /// Own posts, most recent first. Reposts of others are excluded.
    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedPost>, BskyError>;

    async fn upload_limits(&self) -> Result<UploadLimits, BskyError>;

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef, BskyError>;

    /// Facets for `text`. Mentions are dropped unless the implementation can resolve them.
    async fn facets(&self, text: &str) -> Result<Vec<Facet>, BskyError> {
        Ok(facets::detect(text)
            .into_iter()
            .filter_map(facets::Candidate::into_facet)
            .collect())
    }
}

pub struct BskyClient {
    http: Client,
    service: String,
    video_service: String,
    session: Session,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    access_jwt: String,
}

#[derive(Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct CreateSession<'a> {
    identifier: &'a str,
    password: &'a str,
}
#[derive(Deserialize)]
struct UploadBlobOutput {
    #[serde(default)]
    blob: Option<BlobRef>,
}
#[derive(Deserialize)]
struct AuthorFeed {
    feed: Vec<FeedViewPost>,
}
#[derive(Deserialize)]
struct FeedViewPost {
    post: PostView,
    #[serde(default)]
    reason: Option<serde_json::Value>,
}
#[derive(Deserialize)]
struct PostView {
    uri: String,
    cid: String,
    record: PostRecordView,
}
#[derive(Deserialize)]
struct PostRecordView {
    #[serde(default)]
    text: String,
}
#[derive(Deserialize)]
struct ServiceAuth {
    token: String,
}
#[derive(Deserialize)]
struct ResolvedHandle {
    did: String,
}

#[derive(Serialize)]
struct CreateRecord<'a> {
    repo: &'a str,
    collection: &'static str,
    record: PostRecord<'a>,
}
#[derive(Serialize)]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    r#type: &'static str,
    text: &'a str,
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(skip_serializing_if = "is_empty")]
    langs: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    facets: &'a [Facet],
    #[serde(skip_serializing_if = "Option::is_none")]
    embed: Option<&'a Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<&'a ReplyRefs>,
}

impl BskyClient {
    pub async fn login(
        service: &str,
        video_service: &str,
        identifier: &str,
        password: &str,
    ) -> Result<Self, BskyError> {
        let http = Client::new();
        let service = service.trim_end_matches('/').to_owned();

        let res = http
            .post(format!("{service}/xrpc/com.atproto.server.createSession"))
            .json(&CreateSession {
                identifier,
                password,
            })
            .send()
            .await?;
        let session: Session = decode(res).await?;
        debug!(did = %session.did, handle = %session.handle, "logged in");

        Ok(Self {
            http,
            service,
            video_service: video_service.trim_end_matches('/').to_owned(),
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn xrpc(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.session.access_jwt)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        query: &[(&str, String)],
    ) -> Result<T, BskyError> {
        let req = self
            .http
            .get(format!("{}/xrpc/{nsid}", self.service))
            .query(query);
        decode(self.xrpc(req).send().await?).await
    }

    async fn resolve_handle(&self, handle: &str) -> Result<String, BskyError> {
        let resolved: ResolvedHandle = self
            .get(
                "com.atproto.identity.resolveHandle",
                &[("handle", handle.to_owned())],
            )
            .await?;
        Ok(resolved.did)
    }

    /// `did:web` audience of the video service, as `getServiceAuth` wants it.
    fn video_audience(&self) -> String {
        let host = self
            .video_service
            .split_once("://")
            .map_or(self.video_service.as_str(), |(_, host)| host);
        format!("did:web:{}", host.replace(':', "%3A"))
    }
}

#[async_trait]
impl Destination for BskyClient {
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, BskyError> {
        let size = bytes.len();
        let req = self
            .http
            .post(format!("{}/xrpc/com.atproto.repo.uploadBlob", self.service))
            .header(CONTENT_TYPE, mime)
            .body(bytes);
        let out: UploadBlobOutput = decode(self.xrpc(req).send().await?).await?;
        let blob = out.blob.ok_or(BskyError::NoBlob)?;
        debug!(size, mime, cid = %blob.link.link, "uploaded blob");

        Ok(blob)
    }

    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedPost>, BskyError> {
        let feed: AuthorFeed = self
            .get(
                "app.bsky.feed.getAuthorFeed",
                &[
                    ("actor", self.session.did.clone()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(feed
            .feed
            .into_iter()
            .filter(|f| f.reason.is_none())
            .map(|f| FeedPost {
                text: f.post.record.text,
                uri: f.post.uri,
                cid: f.post.cid,
            })
            .collect())
    }

    async fn upload_limits(&self) -> Result<UploadLimits, BskyError> {
        let exp = Utc::now().timestamp() + SERVICE_AUTH_TTL_SECS;
        let auth: ServiceAuth = self
            .get(
                "com.atproto.server.getServiceAuth",
                &[
                    ("aud", self.video_audience()),
                    ("lxm", UPLOAD_LIMITS_NSID.to_owned()),
                    ("exp", exp.to_string()),
                ],
            )
            .await?;

        let res = self
            .http
            .get(format!("{}/xrpc/{UPLOAD_LIMITS_NSID}", self.video_service))
            .bearer_auth(auth.token)
            .send()
            .await?;
        decode(res).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef, BskyError> {
        let body = CreateRecord {
            repo: &self.session.did,
            collection: POST_COLLECTION,
            record: PostRecord {
                r#type: POST_COLLECTION,
                text: &draft.text,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                langs: &draft.langs,
                facets: &draft.facets,
                embed: draft.embed.as_ref(),
                reply: draft.reply.as_ref(),
            },
        };
        let req = self
            .http
            .post(format!("{}/xrpc/com.atproto.repo.createRecord", self.service))
            .json(&body);

        decode(self.xrpc(req).send().await?).await
    }

    async fn facets(&self, text: &str) -> Result<Vec<Facet>, BskyError> {
        let mut out = Vec::new();
        for candidate in facets::detect(text) {
            let (index, handle) = match candidate {
                facets::Candidate::Mention { index, handle } => (index, handle),
                other => {
                    out.extend(other.into_facet());
                    continue;
                }
            };
            match self.resolve_handle(&handle).await {
                Ok(did) => out.push(facets::mention(index, did)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(%handle, error = %e, "mention left as plain text"),
            }
        }
        Ok(out)
    }
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, BskyError> {
    let status = res.status();
    let body = res.text().await?;

    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }

    let XrpcError { error, message } = serde_json::from_str(&body).unwrap_or(XrpcError {
        error: String::new(),
        message: body,
    });
    let auth_error = matches!(
        error.as_str(),
        "AuthenticationRequired" | "ExpiredToken" | "InvalidToken"
    );
    if status == StatusCode::UNAUTHORIZED || auth_error {
        return Err(BskyError::Auth(if message.is_empty() { error } else { message }));
    }

    Err(BskyError::Server {
        status: status.as_u16(),
        error,
        message,
    })
}
