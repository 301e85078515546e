//! Blocklist parser for hosts-file style sources.
//!
//! Accepts the null-route form used by Steven Black style hosts files as well
//! as bare domains, so one file can mix both.

use std::io::BufRead;

use super::{ListParser, ParseError};

/// Parser for blocklist sources.
///
/// # Extraction Rules
///
/// - `0.0.0.0 <domain>...` and `127.0.0.1 <domain>...`: the address prefix is
///   stripped and every following token is taken
/// - A line holding a single token is taken as a bare domain
/// - Lines with any other address prefix are skipped
/// - `#` starts a comment, both at line start and inline
/// - System names (`localhost`, `broadcasthost`, ...) and address-like tokens
///   are ignored
///
/// # Example
///
/// ```text
/// # Comment line
/// 127.0.0.1 localhost
/// 0.0.0.0 ads.example.com tracker.example.com
/// bad-site.org
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HostsFileParser;

/// Domains to ignore (system entries).
const IGNORED_DOMAINS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// Null-route prefixes stripped before the domain token.
const NULL_ROUTE_PREFIXES: &[&str] = &["0.0.0.0", "127.0.0.1"];

impl ListParser for HostsFileParser {
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError> {
        let mut domains = Vec::new();
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

            let line_without_comment = trimmed.split('#').next().unwrap_or(trimmed).trim();
            if line_without_comment.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line_without_comment.split_whitespace().collect();
            let candidates = match parts.as_slice() {
                [single] => std::slice::from_ref(single),
                [prefix, rest @ ..] if NULL_ROUTE_PREFIXES.contains(prefix) => rest,
                _ => continue,
            };

            for domain in candidates {
                if IGNORED_DOMAINS.contains(&domain.to_ascii_lowercase().as_str()) {
                    continue;
                }
                if is_ip_like(domain) {
                    continue;
                }
                domains.push((*domain).to_string());
            }
        }

        Ok(domains)
    }
}

/// Check if a string looks like an IP address.
fn is_ip_like(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    // IPv6-like
    if s.contains(':') {
        return true;
    }

    // All-numeric dotted parts, including junk like "0.0.0.0.0.0.0.0"
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() >= 2 && parts.iter().all(|p| p.parse::<u8>().is_ok())
}
