use serde::{Deserialize, Serialize};

/// Something that can be offered as a suggestion.
pub trait Suggestible {
    fn suggestion_id(&self) -> &str;
    fn suggestion_name(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCandidate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl MentionCandidate {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            image_url: None,
        }
    }
}

impl Suggestible for MentionCandidate {
    fn suggestion_id(&self) -> &str {
        &self.id
    }

    fn suggestion_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCandidate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: String,
}

impl Suggestible for CommandCandidate {
    fn suggestion_id(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate<T> {
    pub candidate: T,
    /// Edit distance to the typed fragment; lower is better.
    pub score: usize,
}

/// Lowercase and strip diacritics so `José` matches `jose`.
pub fn normalize(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .map(nucleo::chars::normalize)
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}')
}

/// Unweighted Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            let delete = prev[j + 1] + 1;
            let insert = cur[j] + 1;
            cur[j + 1] = substitute.min(delete).min(insert);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Filter `candidates` to those whose id or name contains `fragment`, then
/// order by edit distance with ties broken by id. The order depends only on
/// the inputs, so repeated keystrokes on the same list never reshuffle it.
///
/// An empty fragment keeps every candidate, in id order.
pub fn rank_candidates<T: Suggestible + Clone>(
    fragment: &str,
    candidates: &[T],
) -> Vec<RankedCandidate<T>> {
    let needle = normalize(fragment);
    let mut ranked: Vec<RankedCandidate<T>> = candidates
        .iter()
        .filter_map(|candidate| {
            let id = normalize(candidate.suggestion_id());
            let name = candidate.suggestion_name().map(normalize);
            if needle.is_empty() {
                return Some(RankedCandidate {
                    candidate: candidate.clone(),
                    score: 0,
                });
            }
            let hit = id.contains(&needle)
                || name.as_deref().is_some_and(|name| name.contains(&needle));
            if !hit {
                return None;
            }
            let id_score = levenshtein(&needle, &id);
            let score = name.map_or(id_score, |name| id_score.min(levenshtein(&needle, &name)));
            Some(RankedCandidate {
                candidate: candidate.clone(),
                score,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.score
            .cmp(&b.score)
            .then_with(|| a.candidate.suggestion_id().cmp(b.candidate.suggestion_id()))
    });
    ranked
}
