//! Database schema definitions
//!
//! This module provides constants for the table and column names that the
//! builders query directly. The declarative JSON schema files remain the source
//! of truth for what must exist; these constants must agree with them.

/// Raw `message` table mirrored from the source database
pub mod message {
    /// Table name
    pub const TABLE: &str = "message";
    /// Row identifier, stable across mirrors
    pub const ROWID: &str = "ROWID";
    /// Globally unique message identifier
    pub const GUID: &str = "guid";
    /// Message body
    pub const TEXT: &str = "text";
    /// Foreign key to `handle.ROWID`
    pub const HANDLE_ID: &str = "handle_id";
    /// Apple-epoch timestamp
    pub const DATE: &str = "date";
    /// 1 when sent by the database owner
    pub const IS_FROM_ME: &str = "is_from_me";
    /// Delivery service (iMessage, SMS)
    pub const SERVICE: &str = "service";
}

/// Raw `handle` table mirrored from the source database
pub mod handle {
    /// Table name
    pub const TABLE: &str = "handle";
    /// Row identifier
    pub const ROWID: &str = "ROWID";
    /// Phone number or email address
    pub const ID: &str = "id";
}

/// Static `contact` table loaded from a flat file
pub mod contact {
    /// Table name
    pub const TABLE: &str = "contact";
    /// Display name
    pub const CONTACT_NAME: &str = "contact_name";
    /// Phone number or email matching `handle.id`
    pub const CHAT_IDENTIFIER: &str = "chat_identifier";
}

/// Staging table of messages joined to their contact
pub mod message_user {
    /// Table name
    pub const TABLE: &str = "message_user";
    /// Source row identifier
    pub const MESSAGE_ID: &str = "message_id";
    /// Source GUID
    pub const MESSAGE_UID: &str = "message_uid";
    /// Delivery service
    pub const SERVICE: &str = "service";
    /// Resolved contact name, falling back to the raw handle
    pub const CONTACT_NAME: &str = "contact_name";
    /// 1 when sent by the database owner
    pub const IS_FROM_ME: &str = "is_from_me";
    /// UTC timestamp, `YYYY-MM-DD HH:MM:SS`
    pub const SENT_AT: &str = "sent_at";
    /// Message body
    pub const TEXT: &str = "text";
}

/// Staging table with one row per message token
pub mod message_tokens {
    /// Table name
    pub const TABLE: &str = "message_tokens";
    /// Foreign key to `message_user.message_id`
    pub const MESSAGE_ID: &str = "message_id";
    /// 1-based position of the token within its message
    pub const TOKEN_IDX: &str = "token_idx";
    /// Token surface form
    pub const TOKEN: &str = "token";
    /// Fine-grained (Penn Treebank) tag
    pub const POS: &str = "pos";
    /// Universal tag
    pub const POS_SIMPLE: &str = "pos_simple";
}

/// Staging table mapping emoji to a plain-text description
pub mod emoji_text_map {
    /// Table name
    pub const TABLE: &str = "emoji_text_map";
    /// Emoji character sequence
    pub const EMOJI: &str = "emoji";
    /// Description
    pub const EMOJI_TEXT: &str = "emoji_text";
}

/// Staging table of emoji occurrences per message
pub mod message_emoji {
    /// Table name
    pub const TABLE: &str = "message_emoji";
    /// Foreign key to `message_user.message_id`
    pub const MESSAGE_ID: &str = "message_id";
    /// Emoji character sequence
    pub const EMOJI: &str = "emoji";
    /// Occurrences within the message
    pub const N_OCCURRENCES: &str = "n_occurrences";
}

/// Staging table with one row per distinct lowercased token
pub mod token_descriptors {
    /// Table name
    pub const TABLE: &str = "token_descriptors";
    /// Lowercased token
    pub const TOKEN: &str = "token";
    /// Length in characters
    pub const LENGTH: &str = "length";
    /// Snowball stem
    pub const STEM: &str = "stem";
    /// Dictionary form
    pub const LEMMA: &str = "lemma";
    /// 1 when the token is a stopword
    pub const IS_STOPWORD: &str = "is_stopword";
    /// 1 when the token is only punctuation
    pub const IS_PUNCT: &str = "is_punct";
    /// 1 when the token is an emoji
    pub const IS_EMOJI: &str = "is_emoji";
}

/// Staging table of per-contact statistics
pub mod contact_stats {
    /// Table name
    pub const TABLE: &str = "contact_stats";
    /// Contact display name
    pub const CONTACT_NAME: &str = "contact_name";
    /// Messages exchanged
    pub const N_MESSAGES: &str = "n_messages";
    /// Messages sent by the database owner
    pub const N_MESSAGES_FROM_ME: &str = "n_messages_from_me";
    /// Messages received from the contact
    pub const N_MESSAGES_FROM_THEM: &str = "n_messages_from_them";
    /// Tokens across all messages
    pub const N_TOKENS: &str = "n_tokens";
    /// Earliest `sent_at`
    pub const FIRST_MESSAGE_AT: &str = "first_message_at";
    /// Latest `sent_at`
    pub const LAST_MESSAGE_AT: &str = "last_message_at";
}
