//! Attributed text handed to the host renderer.
//!
//! The string is stored once; styling lives in contiguous, non-overlapping
//! runs that together cover every byte. An inline attachment occupies exactly
//! one [`OBJECT_REPLACEMENT`] character and its run carries the attachment.

use std::ops::Range;

use serde::Serialize;

use crate::emoji::ResolvedEmoji;

/// U+FFFC, the placeholder character an attachment run renders over.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FontWeight {
    #[default]
    Regular,
    Medium,
    Semibold,
    Bold,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    pub family: String,
    pub size: f32,
    pub weight: FontWeight,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: "system".to_string(),
            size: 17.0,
            weight: FontWeight::Regular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TextAlignment {
    #[default]
    Natural,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphStyle {
    pub line_height_multiple: f32,
    pub line_spacing: f32,
    pub alignment: TextAlignment,
}

impl Default for ParagraphStyle {
    fn default() -> Self {
        Self {
            line_height_multiple: 1.0,
            line_spacing: 0.0,
            alignment: TextAlignment::Natural,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttachmentSize {
    pub width: f32,
    pub height: f32,
}

/// An emoji drawn inline in place of its shortcode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineAttachment {
    pub shortcode: String,
    pub content: ResolvedEmoji,
    /// Shown while an image is loading or after it failed.
    pub fallback_text: String,
    pub size: AttachmentSize,
    pub baseline_offset: f32,
}

impl InlineAttachment {
    /// Resize to the real image aspect ratio, keeping the line-driven height.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.size.width = self.size.height * (width as f32 / height as f32);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TextAttributes {
    pub font: Font,
    pub paragraph: ParagraphStyle,
    pub attachment: Option<InlineAttachment>,
}

impl TextAttributes {
    pub fn with_font(font: Font) -> Self {
        Self {
            font,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRun {
    pub range: Range<usize>,
    pub attributes: TextAttributes,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AttributedString {
    text: String,
    runs: Vec<AttributeRun>,
}

impl AttributedString {
    pub fn new(text: impl Into<String>, attributes: TextAttributes) -> Self {
        let mut s = Self::default();
        s.push_str(&text.into(), attributes);
        s
    }

    /// Append `text` as a new run. Empty text is ignored.
    pub fn push_str(&mut self, text: &str, attributes: TextAttributes) {
        if text.is_empty() {
            return;
        }
        let start = self.text.len();
        self.text.push_str(text);
        self.runs.push(AttributeRun {
            range: start..self.text.len(),
            attributes,
        });
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn runs(&self) -> &[AttributeRun] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Attributes in effect at byte `offset`. The end of the string reports the
    /// last run so typing at the end continues its style.
    pub fn attributes_at(&self, offset: usize) -> Option<&TextAttributes> {
        self.runs
            .iter()
            .find(|run| run.range.contains(&offset))
            .or_else(|| self.runs.last().filter(|run| run.range.end == offset))
            .map(|run| &run.attributes)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (&Range<usize>, &InlineAttachment)> {
        self.runs.iter().filter_map(|run| {
            run.attributes
                .attachment
                .as_ref()
                .map(|attachment| (&run.range, attachment))
        })
    }

    /// Replace a non-empty byte range with `replacement` styled by
    /// `attributes`, splitting the runs it touches. Returns false and leaves
    /// the string untouched when the range is empty or not on char boundaries.
    pub fn replace_range(
        &mut self,
        range: Range<usize>,
        replacement: &str,
        attributes: TextAttributes,
    ) -> bool {
        if range.is_empty()
            || replacement.is_empty()
            || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return false;
        }

        let delta = replacement.len() as isize - range.len() as isize;
        let shift = |offset: usize| (offset as isize + delta) as usize;
        let new_run = AttributeRun {
            range: range.start..range.start + replacement.len(),
            attributes,
        };

        let mut runs = Vec::with_capacity(self.runs.len() + 2);
        let mut inserted = false;
        for run in self.runs.drain(..) {
            if run.range.end <= range.start {
                runs.push(run);
                continue;
            }
            if run.range.start >= range.end {
                if !inserted {
                    runs.push(new_run.clone());
                    inserted = true;
                }
                runs.push(AttributeRun {
                    range: shift(run.range.start)..shift(run.range.end),
                    attributes: run.attributes,
                });
                continue;
            }
            if run.range.start < range.start {
                runs.push(AttributeRun {
                    range: run.range.start..range.start,
                    attributes: run.attributes.clone(),
                });
            }
            if !inserted {
                runs.push(new_run.clone());
                inserted = true;
            }
            if run.range.end > range.end {
                runs.push(AttributeRun {
                    range: shift(range.end)..shift(run.range.end),
                    attributes: run.attributes,
                });
            }
        }
        if !inserted {
            runs.push(new_run);
        }

        self.text.replace_range(range, replacement);
        self.runs = runs;
        true
    }

    /// Plain text with each attachment replaced by its glyph, or by its
    /// fallback text when it is image-backed. Used for copy and accessibility.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        for run in &self.runs {
            match &run.attributes.attachment {
                Some(attachment) => match &attachment.content {
                    ResolvedEmoji::Glyph(glyph) => out.push_str(glyph),
                    ResolvedEmoji::Image(_) => out.push_str(&attachment.fallback_text),
                },
                None => out.push_str(&self.text[run.range.clone()]),
            }
        }
        out
    }
}
