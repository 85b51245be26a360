use std::ops::Range;
use std::sync::OnceLock;

use super::fence::is_excluded;

fn shortcode_re() -> &'static regex::Regex {
    static SHORTCODE_RE: OnceLock<regex::Regex> = OnceLock::new();
    SHORTCODE_RE.get_or_init(|| regex::Regex::new(r":([\w+-]+):").expect("valid shortcode regex"))
}

/// One `:name:` occurrence in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    /// Byte range of the whole token, colons included.
    pub range: Range<usize>,
    /// The token as typed, e.g. `:smile:`.
    pub token: String,
    /// The identifier between the colons, e.g. `smile`.
    pub name: String,
}

impl MatchSpan {
    /// Byte offset of the closing colon, which may open an adjacent token.
    pub fn closing_colon(&self) -> usize {
        self.range.end - 1
    }

    pub fn overlaps(&self, other: &Range<usize>) -> bool {
        self.range.start < other.end && other.start < self.range.end
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShortcodeMatcher;

impl ShortcodeMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Every token outside `exclusions`, left to right, non-overlapping.
    pub fn scan(&self, text: &str, exclusions: &[Range<usize>]) -> Vec<MatchSpan> {
        if !text.contains(':') {
            return Vec::new();
        }
        shortcode_re()
            .captures_iter(text)
            .filter_map(|caps| span_from_captures(&caps))
            .filter(|span| !is_excluded(&span.range, exclusions))
            .collect()
    }

    /// The token that starts exactly at `start`, if any.
    pub fn token_at(
        &self,
        text: &str,
        start: usize,
        exclusions: &[Range<usize>],
    ) -> Option<MatchSpan> {
        if start >= text.len() || !text.is_char_boundary(start) {
            return None;
        }
        let caps = shortcode_re().captures_at(text, start)?;
        let span = span_from_captures(&caps)?;
        if span.range.start != start || is_excluded(&span.range, exclusions) {
            return None;
        }
        Some(span)
    }
}

fn span_from_captures(caps: &regex::Captures<'_>) -> Option<MatchSpan> {
    let full = caps.get(0)?;
    let name = caps.get(1)?;
    Some(MatchSpan {
        range: full.range(),
        token: full.as_str().to_string(),
        name: name.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::fence::code_fence_ranges;

    fn names(spans: &[MatchSpan]) -> Vec<&str> {
        spans.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn finds_tokens_in_document_order() {
        let text = "hi :wave: and :thumbs-up: plus :+1: :c++:";
        let spans = ShortcodeMatcher::new().scan(text, &[]);
        assert_eq!(names(&spans), vec!["wave", "thumbs-up", "+1", "c++"]);
        assert_eq!(&text[spans[0].range.clone()], ":wave:");
        assert_eq!(spans[0].token, ":wave:");
    }

    #[test]
    fn ignores_malformed_tokens() {
        let spans = ShortcodeMatcher::new().scan("a :: b :not closed and :sp ace:", &[]);
        assert!(spans.is_empty());
    }

    #[test]
    fn skips_tokens_inside_code_fences() {
        let text = "```\n:inside:\n``` :outside:";
        let fences = code_fence_ranges(text);
        let spans = ShortcodeMatcher::new().scan(text, &fences);
        assert_eq!(names(&spans), vec!["outside"]);
    }

    #[test]
    fn first_pass_consumes_shared_colon() {
        let spans = ShortcodeMatcher::new().scan(":nope:smile:", &[]);
        assert_eq!(names(&spans), vec!["nope"]);
    }

    #[test]
    fn token_at_reopens_from_closing_colon() {
        let matcher = ShortcodeMatcher::new();
        let text = ":nope:smile:";
        let first = &matcher.scan(text, &[])[0];
        let next = matcher
            .token_at(text, first.closing_colon(), &[])
            .expect("adjacent token");
        assert_eq!(next.name, "smile");
        assert_eq!(next.range, 5..12);
        assert!(matcher.token_at(text, 1, &[]).is_none());
        assert!(matcher.token_at(text, 99, &[]).is_none());
    }

    #[test]
    fn handles_multibyte_text_around_tokens() {
        let text = "héllo :smile: wörld";
        let spans = ShortcodeMatcher::new().scan(text, &[]);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].range.clone()], ":smile:");
    }
}
