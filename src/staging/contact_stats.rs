use super::incremental::RowBatch;
use super::{Source, StagingBuilder};
use crate::error::Result;
use crate::schema::{contact_stats, message_tokens, message_user};

/// Per-contact message and token counts, recomputed on every run
pub struct ContactStatsBuilder;

impl StagingBuilder for ContactStatsBuilder {
    fn name(&self) -> &'static str {
        contact_stats::TABLE
    }

    fn source(&self) -> Source {
        Source::Query(format!(
            "SELECT u.{contact} AS {contact_out}, \
                    COUNT(*) AS {n_messages}, \
                    SUM(CASE WHEN u.{from_me} = 1 THEN 1 ELSE 0 END) AS {n_from_me}, \
                    SUM(CASE WHEN u.{from_me} = 1 THEN 0 ELSE 1 END) AS {n_from_them}, \
                    COALESCE(SUM(t.n), 0) AS {n_tokens}, \
                    MIN(u.{sent_at}) AS {first_at}, \
                    MAX(u.{sent_at}) AS {last_at} \
             FROM {users} AS u \
             LEFT JOIN (SELECT {token_msg} AS id, COUNT(*) AS n FROM {tokens} GROUP BY {token_msg}) AS t \
               ON t.id = u.{message_id} \
             GROUP BY u.{contact}",
            contact = message_user::CONTACT_NAME,
            contact_out = contact_stats::CONTACT_NAME,
            n_messages = contact_stats::N_MESSAGES,
            from_me = message_user::IS_FROM_ME,
            n_from_me = contact_stats::N_MESSAGES_FROM_ME,
            n_from_them = contact_stats::N_MESSAGES_FROM_THEM,
            n_tokens = contact_stats::N_TOKENS,
            sent_at = message_user::SENT_AT,
            first_at = contact_stats::FIRST_MESSAGE_AT,
            last_at = contact_stats::LAST_MESSAGE_AT,
            users = message_user::TABLE,
            token_msg = message_tokens::MESSAGE_ID,
            tokens = message_tokens::TABLE,
            message_id = message_user::MESSAGE_ID,
        ))
    }

    fn transform(&self, input: RowBatch) -> Result<RowBatch> {
        Ok(input)
    }
}
