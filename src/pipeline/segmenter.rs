//! Sentence segmentation for streamed assistant text.
//!
//! The orchestrator re-runs the segmenter on a growing buffer after every
//! text delta, so everything here is a pure function of its input.

use std::ops::Range;

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc", "ltd",
];

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Returns true if `candidate` ends in an abbreviation such as "Mr.".
fn ends_with_abbreviation(candidate: &str) -> bool {
    let Some(last_word) = candidate.split_whitespace().last() else {
        return false;
    };
    let stem = last_word
        .strip_suffix(is_terminal)
        .unwrap_or(last_word)
        .to_lowercase();
    ABBREVIATIONS.contains(&stem.as_str())
}

/// Byte ranges of the sentences in `text`, in order.
///
/// The last range is the trailing fragment after the final boundary, when
/// one exists. Ranges exclude surrounding whitespace.
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let offset = text.len() - text.trim_start().len();
    let trimmed = text.trim();
    let mut spans = Vec::new();
    if trimmed.is_empty() {
        return spans;
    }

    let mut start = 0;
    let mut chars = trimmed.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }
        // A boundary needs whitespace right after the punctuation.
        match chars.peek() {
            Some(&(_, next)) if next.is_whitespace() => {}
            _ => continue,
        }

        let end = i + c.len_utf8();
        if c == '.' && ends_with_abbreviation(&trimmed[start..end]) {
            continue;
        }

        let mut resume = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            resume = j + w.len_utf8();
            chars.next();
        }

        spans.push(offset + start..offset + end);
        start = resume;
    }

    if start < trimmed.len() {
        spans.push(offset + start..offset + trimmed.len());
    }
    spans
}

/// Splits text into sentences.
///
/// A boundary is `.`, `!` or `?` followed by whitespace, except a period
/// that ends a known abbreviation. The text after the last boundary is
/// returned as the final element, so callers reading a live stream should
/// treat that element as possibly incomplete.
///
/// # Examples
///
/// ```
/// use mouthpiece::pipeline::segmenter::split_into_sentences;
///
/// assert_eq!(
///     split_into_sentences("Hello world. How are you?"),
///     vec!["Hello world.", "How are you?"]
/// );
/// assert_eq!(
///     split_into_sentences("Mr. Smith is here."),
///     vec!["Mr. Smith is here."]
/// );
/// ```
pub fn split_into_sentences(text: &str) -> Vec<String> {
    sentence_spans(text)
        .into_iter()
        .map(|span| text[span].to_string())
        .collect()
}

/// Removes every sentence but the last from `buffer` and returns them.
///
/// The last sentence stays in the buffer (with any trailing whitespace)
/// until more text arrives or the stream ends. Returns an empty vector and
/// leaves the buffer untouched when it holds at most one sentence.
pub fn drain_complete(buffer: &mut String) -> Vec<String> {
    let spans = sentence_spans(buffer);
    let Some((last, complete)) = spans.split_last() else {
        return Vec::new();
    };
    if complete.is_empty() {
        return Vec::new();
    }

    let sentences = complete
        .iter()
        .map(|span| buffer[span.clone()].to_string())
        .collect();
    buffer.drain(..last.start);
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_period() {
        assert_eq!(
            split_into_sentences("Hello world. How are you?"),
            vec!["Hello world.", "How are you?"]
        );
    }

    #[test]
    fn test_splits_on_question_and_exclamation() {
        assert_eq!(split_into_sentences("What? Really!"), vec!["What?", "Really!"]);
    }

    #[test]
    fn test_single_sentence_without_punctuation() {
        assert_eq!(split_into_sentences("Hello world"), vec!["Hello world"]);
        assert_eq!(split_into_sentences("  padded text \n"), vec!["padded text"]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(split_into_sentences("").is_empty());
        assert!(split_into_sentences(" \t\n ").is_empty());
    }

    #[test]
    fn test_abbreviation_does_not_split() {
        assert_eq!(
            split_into_sentences("Mr. Smith is here."),
            vec!["Mr. Smith is here."]
        );
        assert_eq!(
            split_into_sentences("Ask DR. Jones, etc. Then leave. Now"),
            vec!["Ask DR. Jones, etc. Then leave.", "Now"]
        );
    }

    #[test]
    fn test_abbreviation_guard_only_applies_to_periods() {
        assert_eq!(split_into_sentences("Is it Mr? Yes."), vec!["Is it Mr?", "Yes."]);
    }

    #[test]
    fn test_punctuation_without_whitespace_is_not_a_boundary() {
        assert_eq!(
            split_into_sentences("Version 1.5 is out. Get it."),
            vec!["Version 1.5 is out.", "Get it."]
        );
        assert_eq!(split_into_sentences("Wait...what"), vec!["Wait...what"]);
    }

    #[test]
    fn test_multiple_whitespace_between_sentences() {
        assert_eq!(
            split_into_sentences("One.\n\n  Two!   Three"),
            vec!["One.", "Two!", "Three"]
        );
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(
            split_into_sentences("Café ouvert. Très bien! Ça va"),
            vec!["Café ouvert.", "Très bien!", "Ça va"]
        );
    }

    #[test]
    fn test_drain_keeps_single_sentence() {
        let mut buffer = "Hi there. ".to_string();
        assert!(drain_complete(&mut buffer).is_empty());
        assert_eq!(buffer, "Hi there. ");
    }

    #[test]
    fn test_drain_moves_all_but_last() {
        let mut buffer = "Hi there. How can I".to_string();
        assert_eq!(drain_complete(&mut buffer), vec!["Hi there."]);
        assert_eq!(buffer, "How can I");
    }

    #[test]
    fn test_drain_preserves_trailing_whitespace_of_fragment() {
        let mut buffer = "First. Second ".to_string();
        assert_eq!(drain_complete(&mut buffer), vec!["First."]);
        buffer.push_str("part.");
        assert_eq!(buffer, "Second part.");
    }

    #[test]
    fn test_drain_over_incremental_deltas() {
        let deltas = ["Hello", " world. How", " are you? I'm", " fine. Thanks"];
        let mut buffer = String::new();
        let mut sentences = Vec::new();
        for delta in deltas {
            buffer.push_str(delta);
            sentences.extend(drain_complete(&mut buffer));
        }
        assert_eq!(sentences, vec!["Hello world.", "How are you?", "I'm fine."]);
        assert_eq!(buffer.trim(), "Thanks");
    }

    #[test]
    fn test_drain_empty_buffer() {
        let mut buffer = String::new();
        assert!(drain_complete(&mut buffer).is_empty());
        assert!(buffer.is_empty());
    }
}
