//! Plain list parser.
//!
//! One entry per line. Used for the whitelist and the keyword list.

use std::io::BufRead;

use super::{ListParser, ParseError};

/// Parser for one-entry-per-line lists.
///
/// # Format
///
/// - One entry per line
/// - Lines starting with `#` are comments
/// - Empty lines are ignored
/// - Whitespace is trimmed
///
/// # Example
///
/// ```text
/// # Always resolve these
/// example.com
/// cdn.example.org
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainListParser;

impl ListParser for DomainListParser {
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError> {
        let mut entries = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            entries.push(trimmed.to_string());
        }

        Ok(entries)
    }
}
