//! Classification lists: parsing, loading and the shared store.
//!
//! Three newline-delimited sources feed the [`ListStore`]:
//!
//! - **Blocklist**: hosts-file style (`0.0.0.0 ads.example.com`) or bare domains
//! - **Whitelist**: bare domains
//! - **Keywords**: substrings, one per line
//!
//! # Example
//!
//! ```
//! use sinkhole::lists::{ListKind, parser_for_kind};
//! use std::io::BufReader;
//!
//! let parser = parser_for_kind(ListKind::Blocklist);
//! let content = "# Comment\n0.0.0.0 ads.example.com\ntracker.example.com";
//! let entries = parser.parse(&mut BufReader::new(content.as_bytes())).unwrap();
//! assert_eq!(entries, vec!["ads.example.com", "tracker.example.com"]);
//! ```

mod domains;
mod hosts;
pub mod loader;
pub mod manager;
pub mod store;

use std::fmt;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

pub use domains::DomainListParser;
pub use hosts::HostsFileParser;
pub use store::{ListSizes, ListStore, Lists};

/// Error type for list parsing operations.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error during reading.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Which of the three lists an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Blocklist,
    Whitelist,
    Keywords,
}

impl ListKind {
    pub const ALL: [Self; 3] = [Self::Blocklist, Self::Whitelist, Self::Keywords];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocklist => "blocklist",
            Self::Whitelist => "whitelist",
            Self::Keywords => "keywords",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for list parsers.
pub trait ListParser: Send + Sync {
    /// Parse list content and return its entries, in file order.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if reading fails.
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError>;
}

/// Returns a boxed parser for the given list.
#[must_use]
pub fn parser_for_kind(kind: ListKind) -> Box<dyn ListParser> {
    match kind {
        ListKind::Blocklist => Box::new(HostsFileParser),
        ListKind::Whitelist | ListKind::Keywords => Box::new(DomainListParser),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn should_use_hosts_parser_for_blocklist() {
        let parser = parser_for_kind(ListKind::Blocklist);
        let content = "127.0.0.1 ads.example.com";
        let entries = parser
            .parse(&mut BufReader::new(content.as_bytes()))
            .unwrap();
        assert_eq!(entries, vec!["ads.example.com"]);
    }

    #[test]
    fn should_use_plain_parser_for_keywords() {
        let parser = parser_for_kind(ListKind::Keywords);
        let content = "# keywords\nads\ntrack\n";
        let entries = parser
            .parse(&mut BufReader::new(content.as_bytes()))
            .unwrap();
        assert_eq!(entries, vec!["ads", "track"]);
    }

    #[test]
    fn should_display_list_kind() {
        assert_eq!(ListKind::Whitelist.to_string(), "whitelist");
        assert_eq!(ListKind::ALL.len(), 3);
    }
}
