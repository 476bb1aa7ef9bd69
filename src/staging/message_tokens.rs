use rusqlite::types::Value;
use tracing::debug;

use super::incremental::RowBatch;
use super::{Source, StagingBuilder};
use crate::error::Result;
use crate::models::MessageText;
use crate::schema::{message_tokens, message_user};
use crate::token_pipeline::TokenPipeline;

/// Tokenizes and tags every message with non-empty text
pub struct MessageTokensBuilder {
    pipeline: TokenPipeline,
}

impl MessageTokensBuilder {
    /// Create a builder around a configured token pipeline
    #[must_use]
    pub const fn new(pipeline: TokenPipeline) -> Self {
        Self { pipeline }
    }
}

impl StagingBuilder for MessageTokensBuilder {
    fn name(&self) -> &'static str {
        message_tokens::TABLE
    }

    fn source(&self) -> Source {
        Source::Query(format!(
            "SELECT {id}, {text} FROM {table} WHERE {text} IS NOT NULL AND trim({text}) <> ''",
            id = message_user::MESSAGE_ID,
            text = message_user::TEXT,
            table = message_user::TABLE,
        ))
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &[message_tokens::MESSAGE_ID]
    }

    fn transform(&self, input: RowBatch) -> Result<RowBatch> {
        let id_col = input.require_column(message_user::MESSAGE_ID)?;
        let text_col = input.require_column(message_user::TEXT)?;

        let mut output = RowBatch::new(&[
            message_tokens::MESSAGE_ID,
            message_tokens::TOKEN_IDX,
            message_tokens::TOKEN,
            message_tokens::POS,
            message_tokens::POS_SIMPLE,
        ]);
        for row in &input.rows {
            let (Value::Integer(id), Value::Text(text)) = (&row[id_col], &row[text_col]) else {
                continue;
            };
            for record in self.pipeline.tokenize(&MessageText { id: *id, text })? {
                output.push(vec![
                    Value::Integer(record.message_id),
                    Value::Integer(record.token_idx),
                    Value::Text(record.token),
                    Value::Text(record.pos),
                    Value::Text(record.pos_simple),
                ])?;
            }
        }
        debug!(messages = input.len(), tokens = output.len(), "Tokenized batch");
        Ok(output)
    }
}
