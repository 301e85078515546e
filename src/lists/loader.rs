//! File-based list loader.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::{ListKind, ParseError, parser_for_kind};

/// Error type for list file loading operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File was not found at the specified path.
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    /// Permission denied when accessing the file.
    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    /// I/O error while reading the file.
    #[error("I/O error reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing the list content.
    #[error("parse error")]
    Parse(#[from] ParseError),

    /// Task join error from spawning a blocking task.
    #[error("task join error")]
    Join(#[from] tokio::task::JoinError),
}

/// Loads lists from local files.
pub struct FileLoader;

impl FileLoader {
    /// Load one list from a local file, using the parser for `kind`.
    ///
    /// Parsing runs on the blocking pool so large hosts files do not stall
    /// the query loop.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use sinkhole::lists::ListKind;
    /// use sinkhole::lists::loader::FileLoader;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let entries = FileLoader::load(
    ///     Path::new("/etc/sinkhole/blocklist.txt"),
    ///     ListKind::Blocklist,
    /// ).await?;
    /// println!("Loaded {} entries", entries.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(path: &Path, kind: ListKind) -> Result<Vec<String>, LoadError> {
        let path_buf = path.to_path_buf();

        let mut file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(path_buf.clone()),
            std::io::ErrorKind::PermissionDenied => LoadError::PermissionDenied(path_buf.clone()),
            _ => LoadError::Io {
                path: path_buf.clone(),
                source: e,
            },
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .await
            .map_err(|e| LoadError::Io {
                path: path_buf.clone(),
                source: e,
            })?;

        let entries = tokio::task::spawn_blocking(move || {
            let parser = parser_for_kind(kind);
            let mut reader = BufReader::new(content.as_bytes());
            parser.parse(&mut reader)
        })
        .await??;

        Ok(entries)
    }
}
