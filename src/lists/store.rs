//! The shared list store.
//!
//! Readers take an `Arc<Lists>` snapshot; [`ListStore::reload`] builds the
//! replacement completely and swaps the pointer, so a classification running
//! against an old snapshot never sees a half-updated list.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::ListKind;

/// The three classification lists, normalised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lists {
    blocklist: Vec<String>,
    whitelist: Vec<String>,
    keywords: Vec<String>,
}

impl Lists {
    /// Build lists from raw entries.
    ///
    /// Entries are trimmed and lowercased, domain entries lose a trailing dot,
    /// comment and empty entries are dropped, and duplicates are removed while
    /// keeping first-seen order.
    pub fn new<B, W, K>(blocklist: B, whitelist: W, keywords: K) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            blocklist: normalize(blocklist, true),
            whitelist: normalize(whitelist, true),
            keywords: normalize(keywords, false),
        }
    }

    #[inline]
    pub fn blocklist(&self) -> &[String] {
        &self.blocklist
    }

    #[inline]
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    #[inline]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn get(&self, kind: ListKind) -> &[String] {
        match kind {
            ListKind::Blocklist => &self.blocklist,
            ListKind::Whitelist => &self.whitelist,
            ListKind::Keywords => &self.keywords,
        }
    }

    pub fn sizes(&self) -> ListSizes {
        ListSizes {
            blocklist: self.blocklist.len(),
            whitelist: self.whitelist.len(),
            keywords: self.keywords.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn keywords_mut(&mut self) -> &mut Vec<String> {
        &mut self.keywords
    }
}

/// Entry counts per list, as shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListSizes {
    pub blocklist: usize,
    pub whitelist: usize,
    pub keywords: usize,
}

fn normalize<I>(entries: I, domain: bool) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.as_ref().trim();
            let entry = if domain {
                entry.trim_end_matches('.')
            } else {
                entry
            };
            if entry.is_empty() || entry.starts_with('#') {
                return None;
            }
            Some(entry.to_ascii_lowercase())
        })
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Shared handle to the current lists.
///
/// Cloning the store shares the same underlying slot.
#[derive(Debug, Clone, Default)]
pub struct ListStore {
    current: Arc<RwLock<Arc<Lists>>>,
}

impl ListStore {
    pub fn new(lists: Lists) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(lists))),
        }
    }

    /// Snapshot of the lists in effect right now.
    #[must_use]
    pub fn current(&self) -> Arc<Lists> {
        Arc::clone(&self.current.read())
    }

    /// Atomically replace all three lists.
    pub fn reload(&self, lists: Lists) {
        let sizes = lists.sizes();
        *self.current.write() = Arc::new(lists);
        tracing::info!(
            blocklist = sizes.blocklist,
            whitelist = sizes.whitelist,
            keywords = sizes.keywords,
            "lists reloaded"
        );
    }

    pub fn sizes(&self) -> ListSizes {
        self.current.read().sizes()
    }
}
