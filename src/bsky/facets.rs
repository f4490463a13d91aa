//! Rich-text facet detection.
//!
//! Offsets are UTF-8 byte offsets into the post text, as the destination
//! expects them.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{ByteSlice, Facet, FacetFeature};

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").expect("link regex"));
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])(@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,})")
        .expect("mention regex")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(#[^\s#]+)").expect("tag regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '"', '\''];
const MAX_TAG_LEN: usize = 64;

/// Facet found in text, before mentions are resolved to DIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Link { index: ByteSlice, uri: String },
    Mention { index: ByteSlice, handle: String },
    Tag { index: ByteSlice, tag: String },
}

pub fn detect(text: &str) -> Vec<Candidate> {
    let mut found = Vec::new();

    for m in LINK.find_iter(text) {
        let uri = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        found.push(Candidate::Link {
            index: slice(m.start(), uri.len()),
            uri: uri.to_owned(),
        });
    }

    for caps in MENTION.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let handle = &m.as_str()[1..];
        found.push(Candidate::Mention {
            index: slice(m.start(), m.len()),
            handle: handle.to_ascii_lowercase(),
        });
    }

    for caps in TAG.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let raw = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        let tag = &raw[1..];
        if tag.is_empty() || tag.len() > MAX_TAG_LEN || tag.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        found.push(Candidate::Tag {
            index: slice(m.start(), raw.len()),
            tag: tag.to_owned(),
        });
    }

    found.sort_by_key(|c| c.index().byte_start);
    found
}

impl Candidate {
    pub fn index(&self) -> ByteSlice {
        match self {
            Self::Link { index, .. } | Self::Mention { index, .. } | Self::Tag { index, .. } => {
                *index
            }
        }
    }

    /// Facet for links and tags; mentions need a resolved DID first.
    pub fn into_facet(self) -> Option<Facet> {
        let (index, feature) = match self {
            Self::Link { index, uri } => (index, FacetFeature::Link { uri }),
            Self::Tag { index, tag } => (index, FacetFeature::Tag { tag }),
            Self::Mention { .. } => return None,
        };
        Some(Facet {
            index,
            features: vec![feature],
        })
    }
}

pub fn mention(index: ByteSlice, did: String) -> Facet {
    Facet {
        index,
        features: vec![FacetFeature::Mention { did }],
    }
}

fn slice(start: usize, len: usize) -> ByteSlice {
    ByteSlice {
        byte_start: start,
        byte_end: start + len,
    }
}
