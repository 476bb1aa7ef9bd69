use std::collections::HashMap;

use rusqlite::types::Value;

use super::incremental::{KeyValue, RowBatch};
use super::{Source, StagingBuilder};
use crate::error::Result;
use crate::schema::{emoji_text_map, message_emoji, message_tokens};

/// Counts catalogued emoji per message
pub struct MessageEmojiBuilder;

impl StagingBuilder for MessageEmojiBuilder {
    fn name(&self) -> &'static str {
        message_emoji::TABLE
    }

    fn source(&self) -> Source {
        Source::Query(format!(
            "SELECT t.{id} AS {id_out}, t.{token} AS {emoji_out}, t.{idx} AS {idx} \
             FROM {tokens} AS t JOIN {map} AS e ON e.{emoji} = t.{token}",
            id = message_tokens::MESSAGE_ID,
            id_out = message_emoji::MESSAGE_ID,
            token = message_tokens::TOKEN,
            emoji_out = message_emoji::EMOJI,
            idx = message_tokens::TOKEN_IDX,
            tokens = message_tokens::TABLE,
            map = emoji_text_map::TABLE,
            emoji = emoji_text_map::EMOJI,
        ))
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &[message_emoji::MESSAGE_ID]
    }

    fn transform(&self, input: RowBatch) -> Result<RowBatch> {
        let id_col = input.require_column(message_emoji::MESSAGE_ID)?;
        let emoji_col = input.require_column(message_emoji::EMOJI)?;

        // (message, emoji) in first-seen order with a running count
        let mut order: Vec<(Value, Value)> = Vec::new();
        let mut counts: HashMap<(KeyValue, KeyValue), i64> = HashMap::new();
        for row in &input.rows {
            let key = (KeyValue::from(&row[id_col]), KeyValue::from(&row[emoji_col]));
            let count = counts.entry(key).or_insert(0);
            if *count == 0 {
                order.push((row[id_col].clone(), row[emoji_col].clone()));
            }
            *count += 1;
        }

        let mut output = RowBatch::new(&[
            message_emoji::MESSAGE_ID,
            message_emoji::EMOJI,
            message_emoji::N_OCCURRENCES,
        ]);
        for (id, emoji) in order {
            let key = (KeyValue::from(&id), KeyValue::from(&emoji));
            let n = counts.get(&key).copied().unwrap_or(0);
            output.push(vec![id, emoji, Value::Integer(n)])?;
        }
        Ok(output)
    }
}
