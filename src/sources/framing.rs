//! Legacy in-band framing of an origin batch.
//!
//! A batch is four top-level fields (urls, texts, alts, cards) joined with
//! [`FIELD_SEP`]. Each field holds one entry per item joined with
//! [`ITEM_SEP`], newest item first. Multi-slot entries join their slots with
//! [`SLOT_SEP`]; video metadata replaces the alt text of its slot and joins
//! width, height, duration and thumbnail with [`META_SEP`]. Absence is the
//! literal [`NONE`].

use thiserror::Error;

use super::{has_video_extension, CardSlot, MediaSlot, SourceItem, VideoMeta, MEDIA_SLOTS};

pub const FIELD_SEP: &str = "~~~";
pub const ITEM_SEP: &str = "@#%";
pub const SLOT_SEP: &str = "!^&";
pub const META_SEP: &str = "@#*";
pub const NONE: &str = "None";

#[derive(Debug, Error, PartialEq)]
pub enum FramingError {
    #[error("expected 4 top-level fields, found {0}")]
    FieldCount(usize),
    #[error("field lengths differ: {urls} urls, {texts} texts, {alts} alts, {cards} cards")]
    LengthMismatch {
        urls: usize,
        texts: usize,
        alts: usize,
        cards: usize,
    },
    #[error("item {item}: expected 4 {field} slots, found {found}")]
    SlotCount {
        item: usize,
        field: &'static str,
        found: usize,
    },
    #[error("item {item}: malformed card")]
    CardFields { item: usize },
    #[error("item {item} slot {slot}: malformed video metadata")]
    VideoMeta { item: usize, slot: usize },
    #[error("item {item} slot {slot}: alt text contains the metadata separator")]
    AmbiguousAltText { item: usize, slot: usize },
}

/// Parses a framed batch into items ordered oldest first.
pub fn parse_batch(input: &str) -> Result<Vec<SourceItem>, FramingError> {
    let fields: Vec<&str> = input.split(FIELD_SEP).collect();
    let [urls, texts, alts, cards] = fields[..] else {
        return Err(FramingError::FieldCount(fields.len()));
    };

    let urls: Vec<&str> = urls.split(ITEM_SEP).collect();
    let texts: Vec<&str> = texts.split(ITEM_SEP).collect();
    let alts: Vec<&str> = alts.split(ITEM_SEP).collect();
    let cards: Vec<&str> = cards.split(ITEM_SEP).collect();

    let n = texts.len();
    if urls.len() != n || alts.len() != n || cards.len() != n {
        return Err(FramingError::LengthMismatch {
            urls: urls.len(),
            texts: n,
            alts: alts.len(),
            cards: cards.len(),
        });
    }

    let mut items = (0..n)
        .map(|i| parse_item(i, urls[i], texts[i], alts[i], cards[i]))
        .collect::<Result<Vec<_>, _>>()?;
    items.reverse();

    Ok(items)
}

fn parse_item(
    item: usize,
    urls: &str,
    text: &str,
    alts: &str,
    card: &str,
) -> Result<SourceItem, FramingError> {
    let urls = split_slots(item, "url", urls)?;
    let alts = split_slots(item, "alt", alts)?;

    let mut media: [Option<MediaSlot>; MEDIA_SLOTS] = Default::default();
    for (slot, (url, alt)) in urls.into_iter().zip(alts).enumerate() {
        let Some(url) = optional(url) else {
            continue;
        };

        media[slot] = Some(if has_video_extension(url) {
            MediaSlot {
                url: url.to_owned(),
                alt_text: None,
                video: Some(parse_video_meta(alt).ok_or(FramingError::VideoMeta { item, slot })?),
            }
        } else if alt.contains(META_SEP) {
            return Err(FramingError::AmbiguousAltText { item, slot });
        } else {
            MediaSlot::image(url, optional(alt))
        });
    }

    Ok(SourceItem {
        text: text.to_owned(),
        media,
        card: parse_card(item, card)?,
    })
}

fn split_slots<'a>(
    item: usize,
    field: &'static str,
    raw: &'a str,
) -> Result<Vec<&'a str>, FramingError> {
    let slots: Vec<&str> = raw.split(SLOT_SEP).collect();
    if slots.len() != MEDIA_SLOTS {
        return Err(FramingError::SlotCount {
            item,
            field,
            found: slots.len(),
        });
    }
    Ok(slots)
}

fn parse_video_meta(raw: &str) -> Option<VideoMeta> {
    let parts: Vec<&str> = raw.split(META_SEP).collect();
    let [width, height, duration, thumbnail] = parts[..] else {
        return None;
    };

    Some(VideoMeta {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
        duration_secs: duration
            .trim()
            .parse()
            .ok()
            .filter(|d: &f64| d.is_finite())?,
        thumbnail_url: optional(thumbnail).map(str::to_owned),
    })
}

fn parse_card(item: usize, raw: &str) -> Result<Option<CardSlot>, FramingError> {
    if raw == NONE {
        return Ok(None);
    }

    let parts: Vec<&str> = raw.split(SLOT_SEP).collect();
    let [url, title, description, image] = parts[..] else {
        return Err(FramingError::CardFields { item });
    };
    let url = optional(url).ok_or(FramingError::CardFields { item })?;

    Ok(Some(CardSlot {
        url: url.to_owned(),
        title: optional(title).unwrap_or_default().to_owned(),
        description: optional(description).unwrap_or_default().to_owned(),
        image_url: optional(image).map(str::to_owned),
    }))
}

fn optional(raw: &str) -> Option<&str> {
    (raw != NONE && !raw.is_empty()).then_some(raw)
}
