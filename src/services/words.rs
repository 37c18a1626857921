//! Word ladder rules: which word may follow which, and where games start.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use rand::seq::IndexedRandom;
use thiserror::Error;
use tracing::info;

/// Move legality as seen by the game service.
pub trait WordRules: Send + Sync {
    /// Whether `candidate` may follow `current`.
    fn is_valid_move(&self, current: &str, candidate: &str) -> bool;
    /// A start word that has at least one legal follow-up.
    fn random_start_word(&self) -> String;
    /// Every word that may follow `word`.
    fn continuations(&self, word: &str) -> Vec<String>;
}

/// Failures while loading word files.
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read word file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse word file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// No word has any legal follow-up, so no game could ever start.
    #[error("word list has no playable start word")]
    NoStartWord,
}

/// Small built-in ladder used when no word map is configured.
const BUILTIN_WORDS: &[&str] = &[
    "bold", "bolt", "bond", "bone", "bore", "born", "card", "care", "cart", "cold", "colt",
    "cord", "core", "cork", "corn", "dare", "dark", "darn", "dart", "fold", "fond", "font",
    "ford", "fore", "fork", "form", "fort", "gold", "golf", "hard", "hare", "harm", "hold",
    "hole", "holt", "ward", "ware", "warm", "warn", "wart", "word", "wore", "work", "worm",
    "worn",
];

/// In-memory adjacency map of legal moves.
#[derive(Debug, Clone)]
pub struct Lexicon {
    neighbours: HashMap<String, Vec<String>>,
    start_words: Vec<String>,
}

impl Lexicon {
    /// Build from an explicit adjacency map. Start words without any follow-up
    /// are dropped; with none left, every word that has a follow-up qualifies.
    pub fn from_map(
        map: HashMap<String, Vec<String>>,
        start_words: Vec<String>,
    ) -> Result<Self, LexiconError> {
        let neighbours: HashMap<String, Vec<String>> = map
            .into_iter()
            .map(|(word, next)| {
                let next = next.iter().map(|w| w.to_lowercase()).collect();
                (word.to_lowercase(), next)
            })
            .collect();

        let playable = |word: &String| neighbours.get(word).is_some_and(|next| !next.is_empty());
        let mut start_words: Vec<String> = start_words
            .into_iter()
            .map(|word| word.to_lowercase())
            .filter(|word| playable(word))
            .collect();
        if start_words.is_empty() {
            start_words = neighbours.keys().filter(|word| playable(*word)).cloned().collect();
            start_words.sort();
        }
        if start_words.is_empty() {
            return Err(LexiconError::NoStartWord);
        }

        Ok(Self {
            neighbours,
            start_words,
        })
    }

    /// Build from a plain word list, linking words that differ in exactly one letter.
    pub fn from_words<I, S>(words: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: BTreeSet<String> = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();

        // "c_ld" -> [cold, cald, ...]
        let mut buckets: HashMap<String, Vec<&str>> = HashMap::new();
        for word in &words {
            for pattern in wildcard_patterns(word) {
                buckets.entry(pattern).or_default().push(word);
            }
        }

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for word in &words {
            let mut next: BTreeSet<&str> = BTreeSet::new();
            for pattern in wildcard_patterns(word) {
                if let Some(bucket) = buckets.get(&pattern) {
                    next.extend(bucket.iter().copied().filter(|other| *other != word.as_str()));
                }
            }
            map.insert(word.clone(), next.into_iter().map(str::to_owned).collect());
        }

        Self::from_map(map, Vec::new())
    }

    /// The built-in ladder.
    pub fn builtin() -> Result<Self, LexiconError> {
        Self::from_words(BUILTIN_WORDS)
    }

    /// Load a JSON adjacency map (`{"word": ["next", ...]}`) and an optional JSON
    /// array of start words.
    pub fn load(word_map: &Path, start_words: Option<&Path>) -> Result<Self, LexiconError> {
        let map: HashMap<String, Vec<String>> = read_json(word_map)?;
        let starts: Vec<String> = match start_words {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };

        let lexicon = Self::from_map(map, starts)?;
        info!(
            words = lexicon.neighbours.len(),
            start_words = lexicon.start_words.len(),
            path = %word_map.display(),
            "loaded word map"
        );
        Ok(lexicon)
    }

    /// Number of known words.
    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }
}

fn wildcard_patterns(word: &str) -> impl Iterator<Item = String> + '_ {
    word.char_indices().map(move |(at, letter)| {
        let mut pattern = String::with_capacity(word.len());
        pattern.push_str(&word[..at]);
        pattern.push('_');
        pattern.push_str(&word[at + letter.len_utf8()..]);
        pattern
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LexiconError> {
    let raw = fs::read_to_string(path).map_err(|source| LexiconError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LexiconError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl WordRules for Lexicon {
    fn is_valid_move(&self, current: &str, candidate: &str) -> bool {
        self.neighbours
            .get(current)
            .is_some_and(|next| next.iter().any(|word| word == candidate))
    }

    fn random_start_word(&self) -> String {
        self.start_words
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_default()
    }

    fn continuations(&self, word: &str) -> Vec<String> {
        self.neighbours.get(word).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ladder_links_one_letter_changes() {
        let lexicon = Lexicon::builtin().unwrap();
        assert!(lexicon.is_valid_move("cold", "cord"));
        assert!(lexicon.is_valid_move("cord", "cold"));
        assert!(!lexicon.is_valid_move("cold", "warm"));
        assert!(!lexicon.is_valid_move("cold", "cold"));
        assert!(!lexicon.is_valid_move("zzzz", "cold"));
    }

    #[test]
    fn start_words_always_have_a_follow_up() {
        let lexicon = Lexicon::builtin().unwrap();
        for _ in 0..32 {
            let start = lexicon.random_start_word();
            assert!(!lexicon.continuations(&start).is_empty(), "{start} is a dead end");
        }
    }

    #[test]
    fn explicit_map_drops_dead_end_start_words() {
        let map = HashMap::from([
            ("cat".to_string(), vec!["cot".to_string()]),
            ("cot".to_string(), vec!["cat".to_string()]),
            ("dog".to_string(), Vec::new()),
        ]);
        let lexicon = Lexicon::from_map(map, vec!["DOG".into(), "Cat".into()]).unwrap();
        assert_eq!(lexicon.random_start_word(), "cat");
        assert_eq!(lexicon.continuations("cat"), vec!["cot".to_string()]);
    }

    #[test]
    fn isolated_words_cannot_seed_a_game() {
        let err = Lexicon::from_words(["apple", "zebra"]).unwrap_err();
        assert!(matches!(err, LexiconError::NoStartWord));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = Lexicon::load(Path::new("/definitely/not/here.json"), None).unwrap_err();
        match err {
            LexiconError::Read { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
