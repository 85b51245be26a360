//! Triple-backtick code blocks. Shortcodes inside them stay literal.

use std::ops::Range;
use std::sync::OnceLock;

fn fence_re() -> &'static regex::Regex {
    static FENCE_RE: OnceLock<regex::Regex> = OnceLock::new();
    FENCE_RE.get_or_init(|| {
        // Opening fence, optional language tag, body, closing fence. Lazy so
        // fences pair up left to right.
        regex::Regex::new(r"```[\w+#.-]*[ \t]*\n?[\s\S]*?```").expect("valid code fence regex")
    })
}

/// Byte ranges of every fenced block, in document order.
///
/// An opener with no closing fence produces nothing.
pub fn code_fence_ranges(text: &str) -> Vec<Range<usize>> {
    if !text.contains("```") {
        return Vec::new();
    }
    fence_re().find_iter(text).map(|m| m.range()).collect()
}

/// True when `range` lies fully inside one of `exclusions`.
pub fn is_excluded(range: &Range<usize>, exclusions: &[Range<usize>]) -> bool {
    exclusions
        .iter()
        .any(|fence| fence.start <= range.start && range.end <= fence.end)
}
