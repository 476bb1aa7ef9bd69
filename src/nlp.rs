//! Language capabilities the pipeline depends on.
//!
//! The staging builders only talk to the traits below, so any tokenizer,
//! tagger or lexicon can be injected. The default implementations are
//! rule-based English ones built on `rust-stemmers` and `stop-words`.

use anyhow::Result;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use stop_words::{get, LANGUAGE};

use crate::emoji::EMOJI_PATTERN;

/// Splits cleaned text into word tokens, preserving order
pub trait WordTokenizer {
    /// Tokenize text; returned tokens are non-empty
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Assigns a fine-grained (Penn Treebank) tag to each token
pub trait PosTagger {
    /// Tag tokens; the result has one tag per input token
    fn tag(&self, tokens: &[String]) -> Vec<String>;
}

/// Word-level lookups used for token descriptors
pub trait Lexicon {
    /// Stem of a lowercased token
    fn stem(&self, token: &str) -> String;
    /// Dictionary form of a lowercased token
    fn lemma(&self, token: &str) -> String;
    /// Whether the lowercased token is a stopword
    fn is_stopword(&self, token: &str) -> bool;
}

/// Regex tokenizer that keeps emoji, ellipses and placeholders whole
pub struct RegexWordTokenizer {
    token_regex: Regex,
}

impl RegexWordTokenizer {
    /// Create a new tokenizer
    pub fn new() -> Result<Self> {
        let pattern = format!(
            r"xxph\d+xx|{EMOJI_PATTERN}|\.\.\.|…|[\p{{L}}\p{{N}}]+(?:[-'.][\p{{L}}\p{{N}}]+)*|\S"
        );
        let token_regex = Regex::new(&pattern)
            .map_err(|e| anyhow::anyhow!("Failed to compile token regex: {e}"))?;
        Ok(Self { token_regex })
    }
}

impl WordTokenizer for RegexWordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.token_regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// English stemmer, stopword list and rule-based lemmatizer
pub struct EnglishLexicon {
    stopwords: HashSet<String>,
    stemmer: Stemmer,
    irregular: HashMap<&'static str, &'static str>,
}

const IRREGULAR_LEMMAS: &[(&str, &str)] = &[
    ("am", "be"),
    ("is", "be"),
    ("are", "be"),
    ("was", "be"),
    ("were", "be"),
    ("been", "be"),
    ("being", "be"),
    ("has", "have"),
    ("had", "have"),
    ("having", "have"),
    ("does", "do"),
    ("did", "do"),
    ("done", "do"),
    ("went", "go"),
    ("gone", "go"),
    ("goes", "go"),
    ("got", "get"),
    ("gotten", "get"),
    ("made", "make"),
    ("said", "say"),
    ("saw", "see"),
    ("seen", "see"),
    ("came", "come"),
    ("took", "take"),
    ("taken", "take"),
    ("knew", "know"),
    ("known", "know"),
    ("thought", "think"),
    ("told", "tell"),
    ("felt", "feel"),
    ("left", "leave"),
    ("ate", "eat"),
    ("eaten", "eat"),
    ("bought", "buy"),
    ("brought", "bring"),
    ("ran", "run"),
    ("slept", "sleep"),
    ("children", "child"),
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("mice", "mouse"),
    ("better", "good"),
    ("best", "good"),
    ("worse", "bad"),
    ("worst", "bad"),
];

impl EnglishLexicon {
    /// Create a new lexicon
    #[must_use]
    pub fn new() -> Self {
        // Initialize stopwords for English
        let stopwords: HashSet<String> = get(LANGUAGE::English)
            .iter()
            .map(ToString::to_string)
            .collect();

        Self {
            stopwords,
            stemmer: Stemmer::create(Algorithm::English),
            irregular: IRREGULAR_LEMMAS.iter().copied().collect(),
        }
    }
}

impl Default for EnglishLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon for EnglishLexicon {
    fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }

    fn lemma(&self, token: &str) -> String {
        if let Some(lemma) = self.irregular.get(token) {
            return (*lemma).to_string();
        }
        if !token.chars().all(|c| c.is_ascii_alphabetic()) {
            return token.to_string();
        }
        suffix_lemma(token)
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}

fn suffix_lemma(word: &str) -> String {
    let len = word.len();
    if len > 4 && word.ends_with("ies") || len > 3 && word.ends_with("ied") {
        return format!("{}y", &word[..len - 3]);
    }
    if len > 4 && word.ends_with("sses") {
        return word[..len - 2].to_string();
    }
    if len > 5 && word.ends_with("ing") {
        return undouble(&word[..len - 3]);
    }
    if len > 4 && word.ends_with("ed") && !word.ends_with("eed") {
        return undouble(&word[..len - 2]);
    }
    if len > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        return word[..len - 1].to_string();
    }
    word.to_string()
}

/// "runn" -> "run", but "fall" stays "fall"
fn undouble(stem: &str) -> String {
    let bytes = stem.as_bytes();
    if let [.., a, b] = bytes {
        if a == b && !matches!(a, b'l' | b's' | b'z' | b'f' | b'e' | b'o') && !is_vowel(*a) {
            return stem[..stem.len() - 1].to_string();
        }
    }
    stem.to_string()
}

const fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u')
}

/// Whether a token consists only of punctuation characters
#[must_use]
pub fn is_punctuation(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_punctuation() || "…—–“”‘’«»¿¡·•".contains(c))
}
