use chrono::DateTime;
use rusqlite::types::Value;

use super::incremental::RowBatch;
use super::{Source, StagingBuilder};
use crate::error::Result;
use crate::schema::{contact, handle, message, message_user};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Raw dates above this are nanoseconds rather than seconds
const NANOSECOND_THRESHOLD: i64 = 100_000_000_000;

/// Contact name used when a message has neither a contact nor a handle
const UNKNOWN_CONTACT: &str = "Unknown";

/// Convert an Apple-epoch timestamp to `YYYY-MM-DD HH:MM:SS` (UTC)
#[must_use]
pub fn apple_timestamp_to_utc(raw: i64) -> Option<String> {
    let (seconds, nanos) = if raw > NANOSECOND_THRESHOLD {
        (raw / 1_000_000_000, raw % 1_000_000_000)
    } else {
        (raw, 0)
    };
    let nanos = u32::try_from(nanos).ok()?;
    DateTime::from_timestamp(seconds.checked_add(APPLE_EPOCH_OFFSET)?, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Joins messages to their handle and contact, one row per message
pub struct MessageUserBuilder;

impl StagingBuilder for MessageUserBuilder {
    fn name(&self) -> &'static str {
        message_user::TABLE
    }

    fn source(&self) -> Source {
        Source::Query(format!(
            "SELECT m.{rowid} AS {message_id}, m.{guid} AS {message_uid}, m.{service} AS {service_out}, \
             COALESCE(c.{contact_name}, h.{handle_id}, '{UNKNOWN_CONTACT}') AS {contact_out}, \
             m.{is_from_me} AS {is_from_me_out}, m.{date} AS date, m.{text} AS {text_out} \
             FROM {message_table} AS m \
             LEFT JOIN {handle_table} AS h ON h.{handle_rowid} = m.{handle_fk} \
             LEFT JOIN {contact_table} AS c ON c.{chat_identifier} = h.{handle_id}",
            rowid = message::ROWID,
            message_id = message_user::MESSAGE_ID,
            guid = message::GUID,
            message_uid = message_user::MESSAGE_UID,
            service = message::SERVICE,
            service_out = message_user::SERVICE,
            contact_name = contact::CONTACT_NAME,
            handle_id = handle::ID,
            contact_out = message_user::CONTACT_NAME,
            is_from_me = message::IS_FROM_ME,
            is_from_me_out = message_user::IS_FROM_ME,
            date = message::DATE,
            text = message::TEXT,
            text_out = message_user::TEXT,
            message_table = message::TABLE,
            handle_table = handle::TABLE,
            handle_rowid = handle::ROWID,
            handle_fk = message::HANDLE_ID,
            contact_table = contact::TABLE,
            chat_identifier = contact::CHAT_IDENTIFIER,
        ))
    }

    fn natural_key(&self) -> &'static [&'static str] {
        &[message_user::MESSAGE_ID]
    }

    fn transform(&self, input: RowBatch) -> Result<RowBatch> {
        let date = input.require_column("date")?;
        let passthrough = [
            message_user::MESSAGE_ID,
            message_user::MESSAGE_UID,
            message_user::SERVICE,
            message_user::CONTACT_NAME,
            message_user::IS_FROM_ME,
        ]
        .iter()
        .map(|c| input.require_column(c))
        .collect::<Result<Vec<_>>>()?;
        let text = input.require_column(message_user::TEXT)?;

        let mut output = RowBatch::new(&[
            message_user::MESSAGE_ID,
            message_user::MESSAGE_UID,
            message_user::SERVICE,
            message_user::CONTACT_NAME,
            message_user::IS_FROM_ME,
            message_user::SENT_AT,
            message_user::TEXT,
        ]);
        for row in input.rows {
            let sent_at = match &row[date] {
                Value::Integer(raw) => apple_timestamp_to_utc(*raw).map_or(Value::Null, Value::Text),
                _ => Value::Null,
            };
            let mut values: Vec<Value> = passthrough.iter().map(|&i| row[i].clone()).collect();
            values.push(sent_at);
            values.push(row[text].clone());
            output.push(values)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apple_timestamps() {
        assert_eq!(apple_timestamp_to_utc(0).as_deref(), Some("2001-01-01 00:00:00"));
        // seconds since 2001
        assert_eq!(
            apple_timestamp_to_utc(600_000_000).as_deref(),
            Some("2020-01-06 10:40:00")
        );
        // nanoseconds since 2001
        assert_eq!(
            apple_timestamp_to_utc(600_000_000_123_456_789).as_deref(),
            Some("2020-01-06 10:40:00")
        );
    }

    #[test]
    fn test_transform_converts_date() -> Result<()> {
        let mut input = RowBatch::new(&[
            "message_id",
            "message_uid",
            "service",
            "contact_name",
            "is_from_me",
            "date",
            "text",
        ]);
        input.push(vec![
            Value::Integer(7),
            Value::Text("guid-7".to_string()),
            Value::Text("iMessage".to_string()),
            Value::Text("Sam".to_string()),
            Value::Integer(1),
            Value::Integer(0),
            Value::Text("hi".to_string()),
        ])?;

        let output = MessageUserBuilder.transform(input)?;
        let sent_at = output.require_column("sent_at")?;
        assert_eq!(output.rows[0][sent_at], Value::Text("2001-01-01 00:00:00".to_string()));
        assert!(output.column_index("date").is_none());
        Ok(())
    }
}
