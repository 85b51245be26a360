use std::ops::Range;

use crate::offsets::floor_char_boundary;

/// The fragment being typed after a trigger symbol, e.g. `jo` in `hi @jo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSuggestion {
    pub text: String,
    /// Byte range of the fragment, from just after the trigger up to the caret.
    pub range: Range<usize>,
    pub trigger: char,
}

impl TypingSuggestion {
    /// Byte offset of the trigger symbol itself.
    pub fn trigger_offset(&self) -> usize {
        self.range.start - self.trigger.len_utf8()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingSuggestionOptions {
    pub symbol: char,
    /// Only the first non-whitespace character of the text may be the trigger.
    pub only_at_start: bool,
    /// Minimum fragment length, in chars, before a suggestion goes live.
    pub min_chars: usize,
}

impl TypingSuggestionOptions {
    pub fn mentions(symbol: char) -> Self {
        Self {
            symbol,
            only_at_start: false,
            min_chars: 0,
        }
    }

    pub fn commands(symbol: char) -> Self {
        Self {
            symbol,
            only_at_start: true,
            min_chars: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypingSuggester {
    pub options: TypingSuggestionOptions,
}

impl TypingSuggester {
    pub fn new(options: TypingSuggestionOptions) -> Self {
        Self { options }
    }

    /// The live suggestion for `caret` (a byte offset), recomputed from
    /// scratch on every call.
    pub fn suggestion(&self, text: &str, caret: usize) -> Option<TypingSuggestion> {
        let symbol = self.options.symbol;
        let caret = floor_char_boundary(text, caret);
        let before = &text[..caret];

        let trigger_at = before.rfind(symbol)?;
        let fragment_start = trigger_at + symbol.len_utf8();
        let fragment = &before[fragment_start..];
        if fragment.chars().any(char::is_whitespace) {
            return None;
        }

        // The trigger must open a new word: `mail@host` and `@@bob` stay quiet.
        let opens_word = before[..trigger_at]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        if !opens_word {
            return None;
        }

        if self.options.only_at_start {
            let first = text.len() - text.trim_start().len();
            if trigger_at != first {
                return None;
            }
        }

        if fragment.chars().count() < self.options.min_chars {
            return None;
        }

        Some(TypingSuggestion {
            text: fragment.to_string(),
            range: fragment_start..caret,
            trigger: symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mentions() -> TypingSuggester {
        TypingSuggester::new(TypingSuggestionOptions::mentions('@'))
    }

    #[test]
    fn live_right_after_trigger() {
        let text = "hi @jo";
        let s = mentions().suggestion(text, text.len()).unwrap();
        assert_eq!(s.text, "jo");
        assert_eq!(s.range, 4..6);
        assert_eq!(s.trigger, '@');
        assert_eq!(s.trigger_offset(), 3);

        let bare = mentions().suggestion("@", 1).unwrap();
        assert_eq!(bare.text, "");
    }

    #[test]
    fn uses_caret_not_end_of_text() {
        let text = "@amy and @bob";
        let s = mentions().suggestion(text, 3).unwrap();
        assert_eq!(s.text, "am");
        assert!(mentions().suggestion(text, 6).is_none());
    }

    #[test]
    fn whitespace_terminates_trigger() {
        assert!(mentions().suggestion("@amy ", 5).is_none());
        assert!(mentions().suggestion("no trigger", 10).is_none());
    }

    #[test]
    fn trigger_must_open_a_word() {
        assert!(mentions().suggestion("mail@host", 9).is_none());
        assert!(mentions().suggestion("@@bob", 5).is_none());
        assert_eq!(
            mentions().suggestion("x\n@bob", 6).map(|s| s.text),
            Some("bob".to_string())
        );
    }

    #[test]
    fn commands_only_trigger_at_start() {
        let commands = TypingSuggester::new(TypingSuggestionOptions::commands('/'));
        assert_eq!(
            commands.suggestion("  /gi", 5).map(|s| s.text),
            Some("gi".to_string())
        );
        assert!(commands.suggestion("hey /giphy", 10).is_none());
    }

    #[test]
    fn respects_minimum_length_and_multibyte_carets() {
        let suggester = TypingSuggester::new(TypingSuggestionOptions {
            min_chars: 2,
            ..TypingSuggestionOptions::mentions('@')
        });
        assert!(suggester.suggestion("@é", 3).is_none());
        let s = suggester.suggestion("@éa", 4).unwrap();
        assert_eq!(s.text, "éa");
        // A caret inside "é" snaps back to its start.
        assert!(suggester.suggestion("@éa", 2).is_none());
    }
}
