//! In-session search over the message log.
//!
//! Search state is derived: it is recomputed from the live query and message
//! list on every use, never patched incrementally.

use crate::conversation::Message;

/// Indices of messages whose text contains `query` case-insensitively.
/// A blank query means search is inactive and matches nothing.
pub fn filter_matches(messages: &[Message], query: &str) -> Vec<usize> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.text.to_lowercase().contains(&needle))
        .map(|(i, _)| i)
        .collect()
}

/// Splits `text` on case-insensitive occurrences of `query`, preserving the
/// original casing of matched segments. Presentation-only; the underlying
/// text is untouched.
pub fn highlight(text: &str, query: &str) -> Vec<(String, bool)> {
    if query.trim().is_empty() || text.is_empty() {
        return vec![(text.to_string(), false)];
    }

    // Lowercasing can change byte lengths, so keep a map from lowered byte
    // offsets back to offsets in the original text.
    let mut lowered = String::with_capacity(text.len());
    let mut map: Vec<usize> = Vec::with_capacity(text.len() + 1);
    for (i, c) in text.char_indices() {
        for lc in c.to_lowercase() {
            let before = lowered.len();
            lowered.push(lc);
            for _ in before..lowered.len() {
                map.push(i);
            }
        }
    }
    map.push(text.len());

    let needle = query.to_lowercase();
    let mut segments = Vec::new();
    let mut cursor = 0usize; // byte offset into `lowered`
    while let Some(pos) = lowered[cursor..].find(&needle) {
        let start = cursor + pos;
        let end = start + needle.len();
        let (orig_start, orig_end) = (map[start], map[end]);
        let orig_cursor = map[cursor];
        if orig_start > orig_cursor {
            segments.push((text[orig_cursor..orig_start].to_string(), false));
        }
        segments.push((text[orig_start..orig_end].to_string(), true));
        cursor = end;
    }
    let tail = map[cursor];
    if tail < text.len() {
        segments.push((text[tail..].to_string(), false));
    }
    if segments.is_empty() {
        segments.push((text.to_string(), false));
    }
    segments
}

/// Cyclic forward navigation. Identity when there are no matches.
pub fn next_match(match_count: usize, current: usize) -> usize {
    if match_count == 0 {
        return current;
    }
    (current + 1) % match_count
}

/// Cyclic backward navigation. Identity when there are no matches.
pub fn prev_match(match_count: usize, current: usize) -> usize {
    if match_count == 0 {
        return current;
    }
    (current + match_count - 1) % match_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    fn log(texts: &[&str]) -> Vec<Message> {
        texts.iter().map(|t| Message::assistant(*t)).collect()
    }

    #[test]
    fn blank_query_matches_nothing() {
        let messages = log(&["alpha", "beta"]);
        assert!(filter_matches(&messages, "").is_empty());
        assert!(filter_matches(&messages, "   ").is_empty());
    }

    #[test]
    fn filter_is_case_insensitive_and_sound() {
        let messages = log(&["Exam Schedule", "lunch plans", "final EXAM tips"]);
        let matches = filter_matches(&messages, "exam");
        assert_eq!(matches, vec![0, 2]);
        for (i, m) in messages.iter().enumerate() {
            let contains = m.text.to_lowercase().contains("exam");
            assert_eq!(matches.contains(&i), contains);
        }
    }

    #[test]
    fn highlight_preserves_original_casing() {
        let segments = highlight("The Exam is an exam", "exam");
        assert_eq!(
            segments,
            vec![
                ("The ".to_string(), false),
                ("Exam".to_string(), true),
                (" is an ".to_string(), false),
                ("exam".to_string(), true),
            ]
        );
        let rebuilt: String = segments.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(rebuilt, "The Exam is an exam");
    }

    #[test]
    fn highlight_without_match_is_one_plain_segment() {
        assert_eq!(
            highlight("nothing here", "exam"),
            vec![("nothing here".to_string(), false)]
        );
        assert_eq!(highlight("text", ""), vec![("text".to_string(), false)]);
    }

    #[test]
    fn highlight_handles_non_ascii_text() {
        let segments = highlight("परीक्षा exam परीक्षा", "EXAM");
        let rebuilt: String = segments.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(rebuilt, "परीक्षा exam परीक्षा");
        assert_eq!(segments.iter().filter(|(_, hit)| *hit).count(), 1);
    }

    #[test]
    fn next_and_prev_are_mutual_inverses() {
        for count in 1..5usize {
            for i in 0..count {
                assert_eq!(prev_match(count, next_match(count, i)), i);
                assert_eq!(next_match(count, prev_match(count, i)), i);
            }
        }
    }

    #[test]
    fn navigation_wraps_around() {
        assert_eq!(next_match(3, 2), 0);
        assert_eq!(prev_match(3, 0), 2);
    }

    #[test]
    fn empty_matches_leave_index_unchanged() {
        assert_eq!(next_match(0, 7), 7);
        assert_eq!(prev_match(0, 7), 7);
    }
}
