//! Message text to token stream.
//!
//! Cleaning runs as a fixed sequence of string transforms:
//!
//! 1. Unicode NFC normalization and truncation to `nlp.max_text_length`
//! 2. strip URLs
//! 3. drop the zero-width-joiner artifact (U+200D)
//! 4. smart quotes to straight quotes
//! 5. expand contractions ("won't" and "can't" before the suffix rules)
//! 6. pad standalone tokens (ellipsis, dashes, emoji, `! ? ( )`) with spaces
//! 7. collapse whitespace
//!
//! The cleaned text is then protected with reversible placeholders, handed to
//! the injected [`WordTokenizer`], restored, abbreviation-expanded and tagged
//! by the injected [`PosTagger`].

use std::collections::HashMap;

use regex::{Captures, Regex};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::config::NlpConfig;
use crate::emoji::EMOJI_PATTERN;
use crate::error::{EtlError, Result};
use crate::models::{MessageText, TokenRecord};
use crate::nlp::{PosTagger, RegexWordTokenizer, WordTokenizer};
use crate::pos::{universal_tag, LexiconTagger};

const ZERO_WIDTH_JOINER: char = '\u{200D}';

/// Suffix contraction rules, applied after the irregular forms
const CONTRACTIONS: &[(&str, &str)] = &[
    (r"(?i)n't\b", " not"),
    (r"(?i)'re\b", " are"),
    (r"(?i)'s\b", " is"),
    (r"(?i)'d\b", " would"),
    (r"(?i)'ll\b", " will"),
    (r"(?i)'ve\b", " have"),
    (r"(?i)'m\b", " am"),
];

/// Built-in one-word abbreviation expansions
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("bc", "because"),
    ("u", "you"),
    ("ur", "your"),
    ("r", "are"),
    ("tho", "though"),
    ("thru", "through"),
    ("pls", "please"),
    ("plz", "please"),
    ("thx", "thanks"),
    ("ppl", "people"),
];

struct CleaningRules {
    url: Regex,
    irregular: Vec<(Regex, &'static str)>,
    contractions: Vec<(Regex, &'static str)>,
    standalone: Regex,
    whitespace: Regex,
    protected_words: Regex,
    placeholder: Regex,
}

impl CleaningRules {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            url: Regex::new(r"(?i)\b(?:https?://|www\.)\S+")?,
            irregular: vec![
                (Regex::new(r"(?i)\b(w)on't\b")?, "${1}ill not"),
                (Regex::new(r"(?i)\b(c)an't\b")?, "${1}an not"),
            ],
            contractions: CONTRACTIONS
                .iter()
                .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
                .collect::<std::result::Result<_, regex::Error>>()?,
            standalone: Regex::new(&format!(r"(?:{EMOJI_PATTERN}|\.\.\.|…|—|–|[!?()])"))?,
            whitespace: Regex::new(r"\s+")?,
            // Literal placeholders in the input are protected too, so restoring is exact
            protected_words: Regex::new(r"(?i)\b(?:gonna|gotta|wanna)\b|xxph\d+xx")?,
            placeholder: Regex::new(r"xxph(\d+)xx")?,
        })
    }
}

/// Text cleaning, tokenization and tagging for one message at a time
pub struct TokenPipeline {
    tokenizer: Box<dyn WordTokenizer>,
    tagger: Box<dyn PosTagger>,
    abbreviations: HashMap<String, String>,
    max_text_length: usize,
    rules: CleaningRules,
}

impl TokenPipeline {
    /// Create a pipeline with the default English capabilities
    pub fn new(config: &NlpConfig) -> Result<Self> {
        let tokenizer = RegexWordTokenizer::new()?;
        let tagger = LexiconTagger::new().map_err(|e| EtlError::Tokenizer(e.to_string()))?;
        Self::with_capabilities(Box::new(tokenizer), Box::new(tagger), config)
    }

    /// Create a pipeline around an injected tokenizer and tagger
    pub fn with_capabilities(
        tokenizer: Box<dyn WordTokenizer>,
        tagger: Box<dyn PosTagger>,
        config: &NlpConfig,
    ) -> Result<Self> {
        let rules = CleaningRules::compile().map_err(|e| EtlError::Tokenizer(e.to_string()))?;

        let mut abbreviations: HashMap<String, String> = ABBREVIATIONS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        for (abbreviation, expansion) in &config.abbreviations {
            if expansion.split_whitespace().count() != 1 {
                return Err(EtlError::InvalidDefinition(format!(
                    "abbreviation '{abbreviation}' expands to more than one word"
                )));
            }
            abbreviations.insert(abbreviation.to_lowercase(), expansion.clone());
        }

        Ok(Self {
            tokenizer,
            tagger,
            abbreviations,
            max_text_length: config.max_text_length,
            rules,
        })
    }

    /// Apply every cleaning stage to raw message text
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        let mut text: String = text.nfc().collect();
        if text.chars().count() > self.max_text_length {
            debug!(limit = self.max_text_length, "Truncating long message");
            text = text.chars().take(self.max_text_length).collect();
        }

        let text = self.rules.url.replace_all(&text, " ");
        let text: String = text
            .chars()
            .filter(|c| *c != ZERO_WIDTH_JOINER)
            .map(straighten_quote)
            .collect();

        let mut text = text;
        for (pattern, replacement) in &self.rules.irregular {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
        for (pattern, replacement) in &self.rules.contractions {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }

        let padded = self.rules.standalone.replace_all(&text, " ${0} ");
        self.rules.whitespace.replace_all(padded.trim(), " ").into_owned()
    }

    /// Tokenize and tag one message
    pub fn tokenize(&self, message: &MessageText<'_>) -> Result<Vec<TokenRecord>> {
        let cleaned = self.clean(message.text);
        let (protected, originals) = self.protect(&cleaned);

        let tokens: Vec<String> = self
            .tokenizer
            .tokenize(&protected)
            .into_iter()
            .map(|token| self.restore(&token, &originals))
            .filter(|token| !token.trim().is_empty())
            .map(|token| self.expand_abbreviation(token))
            .collect();

        let tags = self.tagger.tag(&tokens);
        if tags.len() != tokens.len() {
            return Err(EtlError::Tokenizer(format!(
                "tagger returned {} tags for {} tokens in message {}",
                tags.len(),
                tokens.len(),
                message.id
            )));
        }

        tokens
            .into_iter()
            .zip(tags)
            .enumerate()
            .map(|(i, (token, pos))| {
                let token_idx = i64::try_from(i + 1)
                    .map_err(|_| EtlError::Tokenizer("token index overflow".to_string()))?;
                Ok(TokenRecord {
                    message_id: message.id,
                    token_idx,
                    pos_simple: universal_tag(&pos).to_string(),
                    token,
                    pos,
                })
            })
            .collect()
    }

    /// Replace words the tokenizer would split with numbered placeholders
    fn protect(&self, text: &str) -> (String, Vec<String>) {
        let mut originals: Vec<String> = Vec::new();
        let replaced = self
            .rules
            .protected_words
            .replace_all(text, |caps: &Captures<'_>| {
                originals.push(caps[0].to_string());
                format!("xxph{}xx", originals.len() - 1)
            })
            .into_owned();

        // Quotes become standalone placeholders; apostrophes inside words stay
        let chars: Vec<char> = replaced.chars().collect();
        let mut protected = String::with_capacity(replaced.len());
        for (i, &c) in chars.iter().enumerate() {
            let inside_word = c == '\''
                && i > 0
                && chars[i - 1].is_alphanumeric()
                && chars.get(i + 1).is_some_and(|next| next.is_alphanumeric());
            if (c == '"' || c == '\'') && !inside_word {
                originals.push(c.to_string());
                protected.push_str(&format!(" xxph{}xx ", originals.len() - 1));
            } else {
                protected.push(c);
            }
        }
        (protected, originals)
    }

    fn restore(&self, token: &str, originals: &[String]) -> String {
        self.rules
            .placeholder
            .replace_all(token, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| originals.get(i))
                    .map_or_else(|| caps[0].to_string(), Clone::clone)
            })
            .into_owned()
    }

    fn expand_abbreviation(&self, token: String) -> String {
        self.abbreviations
            .get(&token.to_lowercase())
            .cloned()
            .unwrap_or(token)
    }
}

const fn straighten_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
        other => other,
    }
}
