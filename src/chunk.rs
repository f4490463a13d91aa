/// One post of a thread split from an over-long item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub total: usize,
}

impl Chunk {
    /// Text as posted, suffixed with its `[i/n]` position.
    pub fn marked(&self) -> String {
        format!("{} [{}/{}]", self.text, self.index + 1, self.total)
    }
}

/// Splits `text` on single spaces into chunks of at most `max_len` chars.
///
/// Words are never broken: a word longer than `max_len` gets a chunk of its
/// own and overshoots. Joining the chunk texts with single spaces gives back
/// `text`.
pub fn split(text: &str, max_len: usize) -> Vec<Chunk> {
    let mut texts = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    // length of the accumulated words, one trailing space each
    let mut len = 0;

    for word in text.split(' ') {
        let word_len = word.chars().count();
        if !words.is_empty() && len + word_len > max_len {
            texts.push(words.join(" "));
            words.clear();
            len = 0;
        }
        len += word_len + 1;
        words.push(word);
    }
    texts.push(words.join(" "));

    let total = texts.len();
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { text, index, total })
        .collect()
}

/// Width of the widest ` [i/n]` marker of a thread of `total` chunks.
fn marker_width(total: usize) -> usize {
    let digits = total.to_string().len();
    " [/]".len() + 2 * digits
}

/// Like [`split`], but keeps every marked chunk within `max_post_len`.
///
/// Starts from `max_chunk_len` and narrows the budget while the marker of
/// the resulting chunk count does not fit. Only an overlong word can still
/// push a post past the limit.
pub fn split_marked(text: &str, max_post_len: usize, max_chunk_len: usize) -> Vec<Chunk> {
    let mut budget = max_chunk_len;
    loop {
        let chunks = split(text, budget);
        let fit = max_post_len.saturating_sub(marker_width(chunks.len()));
        if budget <= fit || fit == 0 {
            return chunks;
        }
        budget = fit;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| "x".repeat(1 + i % 9))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn chunks_fit_and_rebuild_the_text() {
        let text = words(400);

        let chunks = split(&text, 294);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 294));
        assert_eq!(texts(&chunks).join(" "), text);
    }

    #[test]
    fn chunks_are_filled_greedily() {
        let text = words(400);

        let chunks = split(&text, 294);

        for pair in chunks.windows(2) {
            let next_word = pair[1].text.split(' ').next().unwrap();
            let grown = pair[0].text.chars().count() + 1 + next_word.chars().count();
            assert!(grown > 294, "chunk {} could take one more word", pair[0].index);
        }
    }

    #[test]
    fn just_over_the_post_limit_makes_two_chunks() {
        let text = format!("{} {}", "a".repeat(200), "b".repeat(100));
        assert_eq!(text.chars().count(), 301);

        let chunks = split(&text, 294);

        assert_eq!(texts(&chunks), vec!["a".repeat(200), "b".repeat(100)]);
        assert_eq!(chunks[1].total, 2);
    }

    #[test]
    fn overlong_word_gets_its_own_chunk() {
        let long = "y".repeat(300);
        let text = format!("before {long} after");

        let chunks = split(&text, 294);

        assert_eq!(texts(&chunks), vec!["before", long.as_str(), "after"]);
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        let text = ["é".repeat(150), "é".repeat(143)].join(" ");

        assert_eq!(split(&text, 294).len(), 1);
    }

    #[test]
    fn marker_width_follows_chunk_count() {
        assert_eq!(marker_width(3), 6);
        assert_eq!(marker_width(12), 8);
        assert_eq!(marker_width(100), 10);
    }

    #[test]
    fn short_threads_keep_the_chunk_budget() {
        let text = words(400);

        assert_eq!(split_marked(&text, 300, 294), split(&text, 294));
    }

    #[test]
    fn double_digit_markers_stay_within_the_post_limit() {
        let text = (0..700)
            .map(|i| format!("w{i:04}"))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = split_marked(&text, 300, 294);

        assert!(chunks.len() >= 10, "only {} chunks", chunks.len());
        assert!(chunks.iter().all(|c| c.marked().chars().count() <= 300));
        assert_eq!(texts(&chunks).join(" "), text);
    }

    #[test]
    fn marker_is_one_based() {
        let chunks = split("one two", 3);

        assert_eq!(chunks[0].marked(), "one [1/2]");
        assert_eq!(chunks[1].marked(), "two [2/2]");
    }
}
