use anyhow::{anyhow, Result};
use std::path::Path;

/// Longest identifier accepted for a table or column name
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validation utilities for configuration and schema definitions
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a table or column name.
    ///
    /// Names are interpolated into SQL (always quoted), so only plain
    /// identifiers are accepted: a letter or underscore followed by letters,
    /// digits or underscores.
    pub fn validate_identifier(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(anyhow!("Identifier cannot be empty"));
        }

        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(anyhow!(
                "Identifier '{name}' too long (max {MAX_IDENTIFIER_LEN} characters)"
            ));
        }

        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow!("Identifier '{name}' contains invalid characters"));
        }

        if name.to_ascii_lowercase().starts_with("sqlite_") {
            return Err(anyhow!("Identifier '{name}' uses the reserved sqlite_ prefix"));
        }

        Ok(())
    }

    /// Validate a declared column type.
    ///
    /// SQLite allows columns without a type, so an empty type is accepted.
    pub fn validate_declared_type(column: &str, declared: &str) -> Result<()> {
        if !declared
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ',' | '_'))
        {
            return Err(anyhow!(
                "Column '{column}' has an invalid declared type '{declared}'"
            ));
        }

        Ok(())
    }

    /// Validate file path
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return Err(anyhow!("File path cannot be empty"));
        }

        if path_str.contains('\0') {
            return Err(anyhow!("File path contains a null byte"));
        }

        // Check path length
        if path_str.len() > 4096 {
            return Err(anyhow!("File path too long (max 4096 characters)"));
        }

        Ok(())
    }

    /// Validate an abbreviation expansion entry.
    ///
    /// Expansions replace exactly one token, so multi-word expansions are
    /// rejected.
    pub fn validate_abbreviation(abbreviation: &str, expansion: &str) -> Result<()> {
        if abbreviation.trim().is_empty() || expansion.trim().is_empty() {
            return Err(anyhow!("Abbreviation entries cannot be empty"));
        }

        if abbreviation.split_whitespace().count() != 1 {
            return Err(anyhow!("Abbreviation '{abbreviation}' must be a single word"));
        }

        if expansion.split_whitespace().count() != 1 {
            return Err(anyhow!(
                "Expansion '{expansion}' for '{abbreviation}' must be a single word; \
                 multi-word expansions are not supported"
            ));
        }

        Ok(())
    }

    /// Validate a delimiter for static reference files
    pub fn validate_delimiter(delimiter: &str) -> Result<u8> {
        match delimiter.as_bytes() {
            [b] if b.is_ascii() && !b.is_ascii_alphanumeric() && *b != b'"' && *b != b'\n' => {
                Ok(*b)
            },
            _ => Err(anyhow!(
                "Delimiter must be a single ASCII punctuation or whitespace character, got '{delimiter}'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(InputValidator::validate_identifier("message_tokens").is_ok());
        assert!(InputValidator::validate_identifier("ROWID").is_ok());
        assert!(InputValidator::validate_identifier("_private").is_ok());
        assert!(InputValidator::validate_identifier("").is_err());
        assert!(InputValidator::validate_identifier("1table").is_err());
        assert!(InputValidator::validate_identifier("drop table\"x").is_err());
        assert!(InputValidator::validate_identifier("sqlite_sequence").is_err());
    }

    #[test]
    fn test_delimiter() {
        assert_eq!(InputValidator::validate_delimiter(",").ok(), Some(b','));
        assert_eq!(InputValidator::validate_delimiter("\t").ok(), Some(b'\t'));
        assert!(InputValidator::validate_delimiter("ab").is_err());
        assert!(InputValidator::validate_delimiter("a").is_err());
    }
}
