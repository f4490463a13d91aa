use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::config::NormalizeRules;

static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</p>\s*<p[^>]*>").expect("paragraph regex"));
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<br\s*/?>").expect("line break regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static TRUNCATED_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\S*(\.com|\.ca|\.org|\.net)\S*(…|\.\.\.)").expect("truncated link regex")
});

const RETWEET_MARKERS: [&str; 4] = ["RT ", "Retweet ", "retweet ", "RETWEET "];

/// Turns origin HTML content into the plain text posted downstream.
///
/// `card_url` replaces link text the origin truncated with an ellipsis.
pub fn normalize(html: &str, card_url: Option<&str>, rules: &NormalizeRules) -> String {
    let text = PARAGRAPH.replace_all(html, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");

    let mut text = text
        .replace("&nbsp;", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    for strip in &rules.strip {
        text = text.replace(strip.as_str(), "");
    }
    for r in &rules.replacements {
        text = text.replace(r.from.as_str(), &r.to);
    }

    if let Some(url) = card_url {
        text = TRUNCATED_LINK.replace_all(&text, NoExpand(url)).into_owned();
    }

    if let Some(notice) = &rules.retweet_notice {
        if RETWEET_MARKERS.iter().any(|m| text.contains(m)) {
            text.push_str("\n\n");
            text.push_str(notice);
        }
    }

    text.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use crate::config::Replacement;

    use super::*;

    #[test]
    fn converts_markup_to_plain_text() {
        let html = r#"<p>First &amp; <a href="https://x">best</a></p><p>line<br>two&nbsp;</p>"#;

        assert_eq!(
            normalize(html, None, &NormalizeRules::default()),
            "First & best\n\nline\ntwo"
        );
    }

    #[test]
    fn decodes_escaped_angle_brackets_after_stripping_tags() {
        let html = "<p>1 &lt; 2 &gt; 0</p>";

        assert_eq!(normalize(html, None, &NormalizeRules::default()), "1 < 2 > 0");
    }

    #[test]
    fn applies_configured_rules() {
        let rules = NormalizeRules {
            strip: vec!["@twitter.com".into()],
            replacements: vec![Replacement {
                from: "@Team".into(),
                to: "the Team".into(),
            }],
            retweet_notice: Some("(Offer not valid here.)".into()),
        };

        let text = normalize("<p>RT to thank @Team@twitter.com</p>", None, &rules);

        assert_eq!(text, "RT to thank the Team\n\n(Offer not valid here.)");
    }

    #[test]
    fn replaces_truncated_links_with_card_url() {
        let text = normalize(
            "<p>Read more: example.com/articles/long-sl…</p>",
            Some("https://example.com/articles/long-slug"),
            &NormalizeRules::default(),
        );

        assert_eq!(text, "Read more: https://example.com/articles/long-slug");
    }

    #[test]
    fn card_url_is_inserted_literally() {
        let text = normalize(
            "<p>Price: shop.com/items/deal…</p>",
            Some("https://shop.com/items/deal?p=$1&q=${x}"),
            &NormalizeRules::default(),
        );

        assert_eq!(text, "Price: https://shop.com/items/deal?p=$1&q=${x}");
    }
}
