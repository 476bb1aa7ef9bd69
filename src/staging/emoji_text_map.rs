use rusqlite::types::Value;

use super::incremental::RowBatch;
use super::{Source, StagingBuilder};
use crate::emoji::EMOJI_CATALOGUE;
use crate::error::Result;
use crate::schema::emoji_text_map;

/// Rewrites `emoji_text_map` from the built-in emoji catalogue
pub struct EmojiTextMapBuilder;

impl StagingBuilder for EmojiTextMapBuilder {
    fn name(&self) -> &'static str {
        emoji_text_map::TABLE
    }

    fn source(&self) -> Source {
        Source::Generated
    }

    fn transform(&self, _input: RowBatch) -> Result<RowBatch> {
        let mut output = RowBatch::new(&[emoji_text_map::EMOJI, emoji_text_map::EMOJI_TEXT]);
        for (emoji, text) in EMOJI_CATALOGUE {
            output.push(vec![
                Value::Text((*emoji).to_string()),
                Value::Text((*text).to_string()),
            ])?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_whole_catalogue() {
        let output = EmojiTextMapBuilder
            .transform(RowBatch::default())
            .expect("transform");
        assert_eq!(output.columns, vec!["emoji", "emoji_text"]);
        assert_eq!(output.len(), EMOJI_CATALOGUE.len());
    }
}
