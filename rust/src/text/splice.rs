use std::ops::Range;

use crate::emoji::{EmojiMap, ImageKey, ResolvedEmoji};

use super::attributed::{
    AttachmentSize, AttributedString, Font, InlineAttachment, TextAttributes, OBJECT_REPLACEMENT,
};
use super::shortcode::{MatchSpan, ShortcodeMatcher};

// Cap height as a fraction of point size for typical UI fonts. Attachments are
// centered on it so they sit on the text line instead of the baseline.
const CAP_HEIGHT_RATIO: f32 = 0.7;

/// A shortcode that was replaced by an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    /// Range of the token in the input text.
    pub original: Range<usize>,
    /// Range of the attachment character in the output text.
    pub output: Range<usize>,
    pub shortcode: String,
    pub content: ResolvedEmoji,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceOutcome {
    pub string: AttributedString,
    /// Caret translated into output coordinates.
    pub caret: Option<usize>,
    pub replacements: Vec<Replacement>,
    /// Tokens left as plain text because nothing in the map resolved them.
    pub unmatched: Vec<MatchSpan>,
    /// Image sources the caller should start loading, in document order.
    pub image_keys: Vec<ImageKey>,
}

impl SpliceOutcome {
    fn unchanged(input: &AttributedString, caret: Option<usize>, unmatched: Vec<MatchSpan>) -> Self {
        Self {
            string: input.clone(),
            caret,
            replacements: Vec::new(),
            unmatched,
            image_keys: Vec::new(),
        }
    }
}

pub struct Splicer<'a> {
    emojis: &'a EmojiMap,
    scale: f32,
    matcher: ShortcodeMatcher,
}

impl<'a> Splicer<'a> {
    pub fn new(emojis: &'a EmojiMap, scale: f32) -> Self {
        Self {
            emojis,
            scale,
            matcher: ShortcodeMatcher::new(),
        }
    }

    /// Replace every resolvable shortcode outside `exclusions` with an inline
    /// attachment. `caret` is a byte offset into the input text.
    pub fn splice(
        &self,
        input: &AttributedString,
        caret: Option<usize>,
        exclusions: &[Range<usize>],
    ) -> SpliceOutcome {
        let text = input.text();
        let mut planned: Vec<(MatchSpan, ResolvedEmoji)> = Vec::new();
        let mut unmatched: Vec<MatchSpan> = Vec::new();

        for span in self.matcher.scan(text, exclusions) {
            match self.emojis.resolve(&span.name) {
                Some(resolved) => planned.push((span, resolved)),
                None => unmatched.push(span),
            }
        }

        // Second pass: an unresolved token's closing colon can open the next
        // token (`:nope:smile:`), which the first scan already consumed.
        let mut chained_unmatched = Vec::new();
        for miss in &unmatched {
            let mut cursor = miss.closing_colon();
            while let Some(span) = self.matcher.token_at(text, cursor, exclusions) {
                if planned.iter().any(|(done, _)| span.overlaps(&done.range)) {
                    break;
                }
                match self.emojis.resolve(&span.name) {
                    Some(resolved) => {
                        planned.push((span, resolved));
                        break;
                    }
                    None => {
                        cursor = span.closing_colon();
                        if !unmatched.contains(&span) && !chained_unmatched.contains(&span) {
                            chained_unmatched.push(span);
                        }
                    }
                }
            }
        }
        unmatched.extend(chained_unmatched);
        unmatched.sort_by_key(|span| span.range.start);
        unmatched.retain(|span| !planned.iter().any(|(done, _)| done.range == span.range));

        if planned.is_empty() {
            return SpliceOutcome::unchanged(input, caret, unmatched);
        }
        planned.sort_by_key(|(span, _)| span.range.start);

        let placeholder = OBJECT_REPLACEMENT.to_string();
        let mut output = input.clone();
        let mut replacements = Vec::with_capacity(planned.len());
        let mut image_keys: Vec<ImageKey> = Vec::new();
        let mut offset: isize = 0;
        let mut new_caret = caret;

        for (span, resolved) in planned {
            let start = (span.range.start as isize + offset) as usize;
            let end = (span.range.end as isize + offset) as usize;
            let base = output.attributes_at(start).cloned().unwrap_or_default();
            let attachment = self.attachment_for(&span, resolved.clone(), &base.font);
            let attributes = TextAttributes {
                attachment: Some(attachment),
                ..base
            };
            if !output.replace_range(start..end, &placeholder, attributes) {
                tracing::debug!(token = %span.token, "skipping shortcode on invalid range");
                continue;
            }

            let delta = placeholder.len() as isize - span.range.len() as isize;
            if let Some(c) = caret {
                if c >= span.range.end {
                    new_caret = new_caret.map(|n| (n as isize + delta) as usize);
                } else if c > span.range.start {
                    new_caret = Some(start + placeholder.len());
                }
            }
            offset += delta;

            if let Some(key) = resolved.image_key() {
                if !image_keys.contains(key) {
                    image_keys.push(key.clone());
                }
            }
            replacements.push(Replacement {
                original: span.range.clone(),
                output: start..start + placeholder.len(),
                shortcode: span.token,
                content: resolved,
            });
        }

        SpliceOutcome {
            string: output,
            caret: new_caret,
            replacements,
            unmatched,
            image_keys,
        }
    }

    fn attachment_for(&self, span: &MatchSpan, content: ResolvedEmoji, font: &Font) -> InlineAttachment {
        let height = font.size * self.scale;
        InlineAttachment {
            shortcode: span.token.clone(),
            content,
            fallback_text: span.token.clone(),
            size: AttachmentSize {
                width: height,
                height,
            },
            baseline_offset: (font.size * CAP_HEIGHT_RATIO - height) / 2.0,
        }
    }
}
