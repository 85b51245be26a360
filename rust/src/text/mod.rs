//! Shortcode annotation: fence scanning, token matching and splicing.

pub mod attributed;
pub mod fence;
pub mod shortcode;
pub mod splice;

pub use attributed::{
    AttachmentSize, AttributeRun, AttributedString, Font, FontWeight, InlineAttachment,
    ParagraphStyle, TextAlignment, TextAttributes, OBJECT_REPLACEMENT,
};
pub use fence::{code_fence_ranges, is_excluded};
pub use shortcode::{MatchSpan, ShortcodeMatcher};
pub use splice::{Replacement, SpliceOutcome, Splicer};
