/// Content constraints of the destination platform.
///
/// Everything except `can_upload_video` is static. The quota flag is
/// refreshed before every item that carries a video candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformLimits {
    pub max_text_length: usize,
    /// Chunk budget for threads; shrunk further when the `[i/n]` marker grows.
    pub max_chunk_text_length: usize,
    pub max_attachment_bytes: usize,
    pub max_video_duration_secs: f64,
    pub can_upload_video: bool,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            max_text_length: 300,
            max_chunk_text_length: 294,
            max_attachment_bytes: 1_000_000,
            max_video_duration_secs: 180.0,
            can_upload_video: true,
        }
    }
}

impl PlatformLimits {
    pub fn with_video_quota(self, can_upload_video: bool) -> Self {
        Self {
            can_upload_video,
            ..self
        }
    }
}
