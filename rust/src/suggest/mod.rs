//! Mention and command suggestions for the composer.

pub mod rank;
pub mod typing;

pub use rank::{
    levenshtein, normalize, rank_candidates, CommandCandidate, MentionCandidate, RankedCandidate,
    Suggestible,
};
pub use typing::{TypingSuggester, TypingSuggestion, TypingSuggestionOptions};
