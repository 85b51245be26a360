pub mod config;
pub mod emoji;
pub mod images;
pub mod logging;
pub mod offsets;
pub mod suggest;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;

pub use config::{load_config, AnnotatorConfig};
pub use emoji::{EmojiMap, EmojiMapError, EmojiSource, ImageKey, ResolvedEmoji};
pub use images::{
    DecodedImage, DefaultFetcher, FetchError, FetchState, ImageCache, ImageCacheSettings,
    ImageFetcher, ImageSubscription,
};
pub use suggest::{
    rank_candidates, CommandCandidate, MentionCandidate, RankedCandidate, Suggestible,
    TypingSuggester, TypingSuggestion, TypingSuggestionOptions,
};
pub use text::{
    AttributedString, InlineAttachment, MatchSpan, Replacement, TextAttributes,
};

/// Result of annotating one piece of text.
#[derive(Debug)]
pub struct Annotated {
    pub string: AttributedString,
    pub caret: Option<usize>,
    pub replacements: Vec<Replacement>,
    pub unmatched: Vec<MatchSpan>,
    /// One subscription per distinct image in the text. Dropping them cancels
    /// fetches nobody else is waiting on.
    pub images: Vec<ImageSubscription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestions<T> {
    pub typing: TypingSuggestion,
    pub candidates: Vec<RankedCandidate<T>>,
}

/// Entry point for hosts: shortcode annotation plus composer suggestions.
pub struct Annotator {
    config: AnnotatorConfig,
    emojis: Arc<EmojiMap>,
    images: Option<ImageCache>,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig, emojis: Arc<EmojiMap>) -> Self {
        Self {
            config,
            emojis,
            images: None,
        }
    }

    /// Logging, config and an HTTP-backed image cache rooted at `data_dir`.
    pub fn from_data_dir(data_dir: &Path, emojis: Arc<EmojiMap>, runtime: Handle) -> Self {
        logging::init_logging(data_dir);
        let config = load_config(data_dir);
        tracing::info!(emojis = emojis.len(), "annotator starting");

        let fetcher = DefaultFetcher::new(
            reqwest::Client::new(),
            config.asset_dir.clone(),
            config.download_timeout(),
        );
        let cache = ImageCache::new(
            config.image_cache_settings(data_dir),
            Arc::new(fetcher),
            runtime,
        );
        Self::new(config, emojis).with_image_cache(cache)
    }

    pub fn with_image_cache(mut self, cache: ImageCache) -> Self {
        self.images = Some(cache);
        self
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn emojis(&self) -> &Arc<EmojiMap> {
        &self.emojis
    }

    pub fn image_cache(&self) -> Option<&ImageCache> {
        self.images.as_ref()
    }

    /// Swap the emoji map, e.g. after the server pushes new custom emoji.
    pub fn set_emojis(&mut self, emojis: Arc<EmojiMap>) {
        self.emojis = emojis;
    }

    /// Replace shortcodes outside code fences with attachments and start
    /// loading their images. `caret` is a byte offset into `input`.
    pub fn annotate(&self, input: &AttributedString, caret: Option<usize>) -> Annotated {
        let fences = text::code_fence_ranges(input.text());
        let outcome = text::Splicer::new(&self.emojis, self.config.emoji_scale())
            .splice(input, caret, &fences);

        let images = match &self.images {
            Some(cache) => outcome
                .image_keys
                .iter()
                .map(|key| cache.request(key.clone()))
                .collect(),
            None => Vec::new(),
        };

        Annotated {
            string: outcome.string,
            caret: outcome.caret,
            replacements: outcome.replacements,
            unmatched: outcome.unmatched,
            images,
        }
    }

    pub fn annotate_plain(&self, text: &str, attributes: TextAttributes) -> Annotated {
        self.annotate(&AttributedString::new(text, attributes), None)
    }

    pub fn mention_suggestions(
        &self,
        text: &str,
        caret: usize,
        users: &[MentionCandidate],
    ) -> Option<Suggestions<MentionCandidate>> {
        let symbol = first_char(self.config.mention_symbol(), '@');
        self.suggestions(TypingSuggestionOptions::mentions(symbol), text, caret, users)
    }

    pub fn command_suggestions(
        &self,
        text: &str,
        caret: usize,
        commands: &[CommandCandidate],
    ) -> Option<Suggestions<CommandCandidate>> {
        let symbol = first_char(self.config.command_symbol(), '/');
        self.suggestions(TypingSuggestionOptions::commands(symbol), text, caret, commands)
    }

    fn suggestions<T: Suggestible + Clone>(
        &self,
        options: TypingSuggestionOptions,
        text: &str,
        caret: usize,
        candidates: &[T],
    ) -> Option<Suggestions<T>> {
        let typing = TypingSuggester::new(options).suggestion(text, caret)?;
        let mut candidates = rank_candidates(&typing.text, candidates);
        candidates.truncate(self.config.suggestion_limit());
        Some(Suggestions { typing, candidates })
    }
}

fn first_char(s: &str, fallback: char) -> char {
    s.chars().next().unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn annotator() -> Annotator {
        let emojis = EmojiMap::new(HashMap::from([
            ("smile".to_string(), EmojiSource::Character("😄".into())),
            ("happy".to_string(), EmojiSource::Alias("smile".into())),
        ]))
        .unwrap();
        Annotator::new(AnnotatorConfig::default(), Arc::new(emojis))
    }

    #[test]
    fn annotate_without_cache_has_no_subscriptions() {
        let out = annotator().annotate_plain("hi :happy:", TextAttributes::default());
        assert_eq!(out.replacements.len(), 1);
        assert!(out.images.is_empty());
        assert_eq!(out.string.attachments().count(), 1);
    }

    #[test]
    fn suggestions_respect_limit() {
        let config = AnnotatorConfig {
            suggestion_limit: Some(2),
            ..AnnotatorConfig::default()
        };
        let annotator = Annotator::new(config, Arc::new(EmojiMap::default()));
        let users: Vec<MentionCandidate> = ["ann", "anna", "annie"]
            .into_iter()
            .map(|id| MentionCandidate::new(id, None))
            .collect();
        let text = "hey @an";
        let found = annotator
            .mention_suggestions(text, text.len(), &users)
            .unwrap();
        assert_eq!(found.typing.text, "an");
        assert_eq!(found.candidates.len(), 2);
        assert_eq!(found.candidates[0].candidate.id, "ann");
    }

    #[test]
    fn configured_command_symbol_is_used() {
        let config = AnnotatorConfig {
            command_symbol: Some("!".into()),
            ..AnnotatorConfig::default()
        };
        let annotator = Annotator::new(config, Arc::new(EmojiMap::default()));
        let commands = vec![CommandCandidate {
            name: "giphy".into(),
            description: String::new(),
            args: String::new(),
        }];
        assert!(annotator.command_suggestions("/gi", 3, &commands).is_none());
        let found = annotator.command_suggestions("!gi", 3, &commands).unwrap();
        assert_eq!(found.candidates.len(), 1);
    }
}
