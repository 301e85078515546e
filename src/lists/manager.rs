//! List manager with hot-reload support.
//!
//! Loads the three configured list sources, merges them with inline entries
//! from the config, and swaps the result into the shared [`ListStore`].

use std::collections::HashMap;

use parking_lot::RwLock;

use super::loader::{FileLoader, LoadError};
use super::{ListKind, ListSizes, ListStore, Lists};
use crate::config::ListsConfig;

/// Coordinates list reloads for a [`ListStore`].
///
/// A source that fails to load keeps the entries it had before, so a
/// transient read error never empties the blocklist.
///
/// # Example
///
/// ```no_run
/// use sinkhole::config::Config;
/// use sinkhole::lists::ListStore;
/// use sinkhole::lists::manager::ListManager;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load("config.toml")?;
/// let store = ListStore::default();
/// let manager = ListManager::new(&config.lists, store.clone());
/// manager.reload().await;
/// println!("{} blocklist entries", store.sizes().blocklist);
/// # Ok(())
/// # }
/// ```
pub struct ListManager {
    config: ListsConfig,
    store: ListStore,
    /// Entries last loaded from each file, kept for failed reloads.
    file_entries: RwLock<HashMap<ListKind, Vec<String>>>,
}

impl ListManager {
    pub fn new(config: &ListsConfig, store: ListStore) -> Self {
        Self {
            config: config.clone(),
            store,
            file_entries: RwLock::new(HashMap::new()),
        }
    }

    /// The store this manager writes to.
    #[must_use]
    pub fn store(&self) -> ListStore {
        self.store.clone()
    }

    /// Reload every source and swap the merged lists in.
    ///
    /// Returns the new list sizes. Failed sources are logged and keep their
    /// previous entries.
    pub async fn reload(&self) -> ListSizes {
        for kind in ListKind::ALL {
            let Some(path) = self.config.path(kind) else {
                continue;
            };

            tracing::debug!(list = %kind, path = ?path, "loading list file");
            match FileLoader::load(path, kind).await {
                Ok(entries) => {
                    tracing::info!(list = %kind, count = entries.len(), "loaded list file");
                    self.file_entries.write().insert(kind, entries);
                }
                Err(err) => {
                    tracing::error!(
                        list = %kind,
                        path = ?path,
                        error = ?err,
                        "failed to load list file, keeping previous entries"
                    );
                }
            }
        }

        let lists = self.merged();
        let sizes = lists.sizes();
        self.store.reload(lists);
        sizes
    }

    /// Reload a single list from its file.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] when the file cannot be read; the store is
    /// left unchanged in that case. A list with no configured file only
    /// re-applies its inline entries.
    pub async fn reload_list(&self, kind: ListKind) -> Result<ListSizes, LoadError> {
        if let Some(path) = self.config.path(kind) {
            let entries = FileLoader::load(path, kind).await?;
            tracing::info!(list = %kind, count = entries.len(), "reloaded list file");
            self.file_entries.write().insert(kind, entries);
        }

        let lists = self.merged();
        let sizes = lists.sizes();
        self.store.reload(lists);
        Ok(sizes)
    }

    fn merged(&self) -> Lists {
        let files = self.file_entries.read();
        let entries = |kind: ListKind| {
            self.config
                .inline(kind)
                .iter()
                .chain(files.get(&kind).into_iter().flatten())
                .cloned()
                .collect::<Vec<_>>()
        };

        Lists::new(
            entries(ListKind::Blocklist),
            entries(ListKind::Whitelist),
            entries(ListKind::Keywords),
        )
    }
}
