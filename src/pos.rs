//! Rule-based part-of-speech tagging.
//!
//! `LexiconTagger` tags closed-class words from a lexicon and falls back to
//! suffix and neighbour rules for everything else. Tags are Penn Treebank;
//! [`universal_tag`] maps them onto the coarse universal tagset.

use std::collections::HashMap;

use regex::Regex;

use crate::emoji::whole_emoji_regex;
use crate::nlp::{is_punctuation, PosTagger};

const LEXICON: &[(&str, &str)] = &[
    // pronouns
    ("i", "PRP"),
    ("you", "PRP"),
    ("he", "PRP"),
    ("she", "PRP"),
    ("it", "PRP"),
    ("we", "PRP"),
    ("they", "PRP"),
    ("me", "PRP"),
    ("him", "PRP"),
    ("us", "PRP"),
    ("them", "PRP"),
    ("myself", "PRP"),
    ("yourself", "PRP"),
    ("himself", "PRP"),
    ("herself", "PRP"),
    ("itself", "PRP"),
    ("ourselves", "PRP"),
    ("themselves", "PRP"),
    ("my", "PRP$"),
    ("your", "PRP$"),
    ("his", "PRP$"),
    ("her", "PRP$"),
    ("its", "PRP$"),
    ("our", "PRP$"),
    ("their", "PRP$"),
    // determiners
    ("the", "DT"),
    ("a", "DT"),
    ("an", "DT"),
    ("this", "DT"),
    ("that", "DT"),
    ("these", "DT"),
    ("those", "DT"),
    ("every", "DT"),
    ("each", "DT"),
    ("some", "DT"),
    ("any", "DT"),
    ("no", "DT"),
    ("all", "DT"),
    ("both", "DT"),
    ("another", "DT"),
    // prepositions and subordinators
    ("in", "IN"),
    ("on", "IN"),
    ("at", "IN"),
    ("of", "IN"),
    ("for", "IN"),
    ("with", "IN"),
    ("about", "IN"),
    ("from", "IN"),
    ("by", "IN"),
    ("into", "IN"),
    ("over", "IN"),
    ("after", "IN"),
    ("before", "IN"),
    ("under", "IN"),
    ("between", "IN"),
    ("through", "IN"),
    ("during", "IN"),
    ("without", "IN"),
    ("like", "IN"),
    ("than", "IN"),
    ("because", "IN"),
    ("if", "IN"),
    ("while", "IN"),
    ("since", "IN"),
    ("until", "IN"),
    ("as", "IN"),
    ("though", "IN"),
    ("although", "IN"),
    ("whether", "IN"),
    ("unless", "IN"),
    ("upon", "IN"),
    // conjunctions
    ("and", "CC"),
    ("or", "CC"),
    ("but", "CC"),
    ("nor", "CC"),
    ("yet", "CC"),
    ("plus", "CC"),
    ("to", "TO"),
    // modals
    ("can", "MD"),
    ("could", "MD"),
    ("will", "MD"),
    ("would", "MD"),
    ("shall", "MD"),
    ("should", "MD"),
    ("may", "MD"),
    ("might", "MD"),
    ("must", "MD"),
    // common verb forms
    ("be", "VB"),
    ("is", "VBZ"),
    ("has", "VBZ"),
    ("does", "VBZ"),
    ("am", "VBP"),
    ("are", "VBP"),
    ("have", "VBP"),
    ("do", "VBP"),
    ("was", "VBD"),
    ("were", "VBD"),
    ("had", "VBD"),
    ("did", "VBD"),
    ("said", "VBD"),
    ("went", "VBD"),
    ("got", "VBD"),
    ("made", "VBD"),
    ("came", "VBD"),
    ("saw", "VBD"),
    ("thought", "VBD"),
    ("told", "VBD"),
    ("been", "VBN"),
    ("gone", "VBN"),
    ("done", "VBN"),
    ("seen", "VBN"),
    ("being", "VBG"),
    ("going", "VBG"),
    ("gonna", "VBG"),
    ("gotta", "VBN"),
    ("wanna", "VBP"),
    // adverbs
    ("not", "RB"),
    ("very", "RB"),
    ("really", "RB"),
    ("just", "RB"),
    ("also", "RB"),
    ("too", "RB"),
    ("so", "RB"),
    ("now", "RB"),
    ("then", "RB"),
    ("here", "RB"),
    ("there", "RB"),
    ("always", "RB"),
    ("never", "RB"),
    ("still", "RB"),
    ("already", "RB"),
    ("even", "RB"),
    ("maybe", "RB"),
    ("ever", "RB"),
    ("again", "RB"),
    ("soon", "RB"),
    ("only", "RB"),
    ("pretty", "RB"),
    ("quite", "RB"),
    ("almost", "RB"),
    ("back", "RB"),
    ("away", "RB"),
    ("out", "RP"),
    ("up", "RP"),
    ("off", "RP"),
    ("down", "RP"),
    // wh-words
    ("when", "WRB"),
    ("where", "WRB"),
    ("why", "WRB"),
    ("how", "WRB"),
    ("who", "WP"),
    ("what", "WP"),
    ("whom", "WP"),
    ("which", "WDT"),
    ("whose", "WP$"),
    // interjections
    ("yes", "UH"),
    ("yeah", "UH"),
    ("yep", "UH"),
    ("nope", "UH"),
    ("ok", "UH"),
    ("okay", "UH"),
    ("oh", "UH"),
    ("hey", "UH"),
    ("hi", "UH"),
    ("hello", "UH"),
    ("lol", "UH"),
    ("haha", "UH"),
    ("wow", "UH"),
    ("omg", "UH"),
    ("thanks", "UH"),
    ("please", "UH"),
    ("bye", "UH"),
    ("hmm", "UH"),
    ("ugh", "UH"),
    // adjectives
    ("good", "JJ"),
    ("great", "JJ"),
    ("bad", "JJ"),
    ("new", "JJ"),
    ("old", "JJ"),
    ("big", "JJ"),
    ("little", "JJ"),
    ("happy", "JJ"),
    ("sad", "JJ"),
    ("sure", "JJ"),
    ("nice", "JJ"),
    ("cool", "JJ"),
    ("fine", "JJ"),
    ("late", "JJ"),
    ("early", "JJ"),
    ("hard", "JJ"),
    ("long", "JJ"),
    ("better", "JJR"),
    ("worse", "JJR"),
    ("best", "JJS"),
    ("worst", "JJS"),
    // nouns that look like something else
    ("today", "NN"),
    ("tonight", "NN"),
    ("tomorrow", "NN"),
    ("yesterday", "NN"),
    ("thing", "NN"),
    ("things", "NNS"),
    ("people", "NNS"),
    // number words
    ("one", "CD"),
    ("two", "CD"),
    ("three", "CD"),
    ("four", "CD"),
    ("five", "CD"),
    ("six", "CD"),
    ("seven", "CD"),
    ("eight", "CD"),
    ("nine", "CD"),
    ("ten", "CD"),
    ("hundred", "CD"),
    ("thousand", "CD"),
];

const ADJECTIVE_SUFFIXES: &[&str] = &["ous", "ful", "ive", "able", "ible", "ish", "less", "ic", "al"];

/// Lexicon and rule based Penn Treebank tagger
pub struct LexiconTagger {
    lexicon: HashMap<&'static str, &'static str>,
    number: Regex,
    emoji: Regex,
}

impl LexiconTagger {
    /// Create a new tagger
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            lexicon: LEXICON.iter().copied().collect(),
            number: Regex::new(r"^[+-]?\d+(?:[.,:/]\d+)*(?:st|nd|rd|th|s|k|am|pm)?$")?,
            emoji: whole_emoji_regex()?,
        })
    }

    fn lexical_tag(&self, token: &str, lower: &str) -> Option<&'static str> {
        if let Some(tag) = punctuation_tag(token) {
            return Some(tag);
        }
        if self.emoji.is_match(token) {
            return Some("SYM");
        }
        if self.number.is_match(lower) {
            return Some("CD");
        }
        self.lexicon.get(lower).copied()
    }
}

fn punctuation_tag(token: &str) -> Option<&'static str> {
    let tag = match token {
        "." | "!" | "?" | "?!" | "!!" | "??" => ".",
        "," => ",",
        ":" | ";" | "..." | "…" | "-" | "--" | "—" | "–" => ":",
        "(" | "[" | "{" => "(",
        ")" | "]" | "}" => ")",
        "\"" | "“" => "``",
        "'" | "”" | "’" => "''",
        "$" => "$",
        "#" => "#",
        _ if is_punctuation(token) => ".",
        _ => return None,
    };
    Some(tag)
}

fn suffix_tag(token: &str, lower: &str, position: usize) -> &'static str {
    let alphabetic = lower.chars().all(char::is_alphabetic);
    if position > 0 && token.chars().next().is_some_and(char::is_uppercase) {
        return "NNP";
    }
    if !alphabetic {
        return "NN";
    }
    if lower.len() > 3 && lower.ends_with("ly") {
        return "RB";
    }
    if lower.len() > 4 && lower.ends_with("ing") {
        return "VBG";
    }
    if lower.len() > 3 && lower.ends_with("ed") {
        return "VBD";
    }
    if lower.len() > 4 && ADJECTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return "JJ";
    }
    if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") {
        return "NNS";
    }
    "NN"
}

impl PosTagger for LexiconTagger {
    fn tag(&self, tokens: &[String]) -> Vec<String> {
        let mut tags: Vec<&'static str> = Vec::with_capacity(tokens.len());

        for (position, token) in tokens.iter().enumerate() {
            let lower = token.to_lowercase();
            let previous = tags.last().copied();
            let previous_word = position
                .checked_sub(1)
                .map(|i| tokens[i].to_lowercase());

            let tag = if let Some(tag) = self.lexical_tag(token, &lower) {
                match (tag, previous) {
                    // "there is" / "there are"
                    ("VBZ" | "VBP" | "VBD", _) if previous_word.as_deref() == Some("there") => {
                        if let Some(last) = tags.last_mut() {
                            *last = "EX";
                        }
                        tag
                    },
                    // "to go", "will go": the word after a modal is a base verb
                    ("VBP", Some("TO" | "MD")) => "VB",
                    _ => tag,
                }
            } else {
                let guessed = suffix_tag(token, &lower, position);
                match (guessed, previous) {
                    ("NN", Some("TO" | "MD")) => "VB",
                    ("VBD", Some("VBZ" | "VBP" | "VBD" | "VB")) => "VBN",
                    ("NN", Some("PRP")) if matches!(
                        previous_word.as_deref(),
                        Some("i" | "you" | "we" | "they")
                    ) => "VBP",
                    ("NNS", Some("PRP")) if matches!(
                        previous_word.as_deref(),
                        Some("he" | "she" | "it")
                    ) => "VBZ",
                    _ => guessed,
                }
            };
            tags.push(tag);
        }

        tags.into_iter().map(str::to_string).collect()
    }
}

/// Map a Penn Treebank tag onto the universal tagset
#[must_use]
pub fn universal_tag(penn: &str) -> &'static str {
    match penn {
        "!" | "#" | "$" | "''" | "(" | ")" | "," | "-LRB-" | "-RRB-" | "." | ":" | "?" | "``" => ".",
        "CC" => "CONJ",
        "CD" => "NUM",
        "DT" | "EX" | "PDT" | "WDT" => "DET",
        "IN" => "ADP",
        "JJ" | "JJR" | "JJRJR" | "JJS" => "ADJ",
        "MD" | "VB" | "VBD" | "VBG" | "VBN" | "VBP" | "VBZ" => "VERB",
        "NN" | "NNP" | "NNPS" | "NNS" | "NP" => "NOUN",
        "PRP" | "PRP$" | "WP" | "WP$" => "PRON",
        "RB" | "RBR" | "RBS" | "WRB" => "ADV",
        "POS" | "RP" | "TO" => "PRT",
        _ => "X",
    }
}
