use std::collections::HashSet;

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::Connection;

use super::incremental::RowBatch;
use super::{Source, StagingBuilder};
use crate::emoji::{whole_emoji_regex, EMOJI_CATALOGUE};
use crate::error::{EtlError, Result};
use crate::models::TokenDescriptor;
use crate::nlp::{is_punctuation, Lexicon};
use crate::schema::{message_tokens, token_descriptors};

/// SQL scalar folding text with Unicode lowercasing; SQLite's `lower()` only folds ASCII
pub const UNICODE_LOWER: &str = "unicode_lower";

/// One descriptor row per distinct lowercased token
pub struct TokenDescriptorsBuilder {
    lexicon: Box<dyn Lexicon>,
    emoji: Regex,
    catalogue: HashSet<&'static str>,
}

impl TokenDescriptorsBuilder {
    /// Create a builder around an injected lexicon
    pub fn new(lexicon: Box<dyn Lexicon>) -> Result<Self> {
        Ok(Self {
            lexicon,
            emoji: whole_emoji_regex().map_err(|e| EtlError::Tokenizer(e.to_string()))?,
            catalogue: EMOJI_CATALOGUE.iter().map(|(emoji, _)| *emoji).collect(),
        })
    }

    /// Describe one lowercased token
    #[must_use]
    pub fn describe(&self, token: &str) -> TokenDescriptor {
        let token = token.to_lowercase();
        TokenDescriptor {
            length: i64::try_from(token.chars().count()).unwrap_or(i64::MAX),
            stem: self.lexicon.stem(&token),
            lemma: self.lexicon.lemma(&token),
            is_stopword: self.lexicon.is_stopword(&token),
            is_punct: is_punctuation(&token),
            is_emoji: self.catalogue.contains(token.as_str()) || self.emoji.is_match(&token),
            token,
        }
    }
}

impl StagingBuilder for TokenDescriptorsBuilder {
    fn name(&self) -> &'static str {
        token_descriptors::TABLE
    }

    fn register_functions(&self, conn: &Connection) -> Result<()> {
        conn.create_scalar_function(
            UNICODE_LOWER,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )?;
        Ok(())
    }

    fn source(&self) -> Source {
        Source::Query(format!(
            "SELECT DISTINCT {UNICODE_LOWER}({token}) AS {out} FROM {table}",
            token = message_tokens::TOKEN,
            out = token_descriptors::TOKEN,
            table = message_tokens::TABLE,
        ))
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &[token_descriptors::TOKEN]
    }

    fn transform(&self, input: RowBatch) -> Result<RowBatch> {
        let token_col = input.require_column(token_descriptors::TOKEN)?;

        let mut output = RowBatch::new(&[
            token_descriptors::TOKEN,
            token_descriptors::LENGTH,
            token_descriptors::STEM,
            token_descriptors::LEMMA,
            token_descriptors::IS_STOPWORD,
            token_descriptors::IS_PUNCT,
            token_descriptors::IS_EMOJI,
        ]);
        for row in &input.rows {
            let Value::Text(token) = &row[token_col] else {
                continue;
            };
            let descriptor = self.describe(token);
            output.push(vec![
                Value::Text(descriptor.token),
                Value::Integer(descriptor.length),
                Value::Text(descriptor.stem),
                Value::Text(descriptor.lemma),
                Value::Integer(i64::from(descriptor.is_stopword)),
                Value::Integer(i64::from(descriptor.is_punct)),
                Value::Integer(i64::from(descriptor.is_emoji)),
            ])?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::EnglishLexicon;

    fn builder() -> TokenDescriptorsBuilder {
        TokenDescriptorsBuilder::new(Box::new(EnglishLexicon::new())).expect("builder")
    }

    #[test]
    fn test_describe() {
        let builder = builder();
        let running = builder.describe("Running");
        assert_eq!(running.token, "running");
        assert_eq!(running.length, 7);
        assert_eq!(running.stem, "run");
        assert_eq!(running.lemma, "run");
        assert!(!running.is_stopword);

        assert!(builder.describe("the").is_stopword);
        assert!(builder.describe("...").is_punct);
        assert!(builder.describe("😂").is_emoji);
        assert!(!builder.describe("😂").is_punct);
    }
}
