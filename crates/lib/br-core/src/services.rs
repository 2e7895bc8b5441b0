use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Limits for the shared file context.
#[derive(Debug, Clone, Copy)]
pub struct FileContextConfig {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl FileContextConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_files: 32,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }

    #[must_use]
    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    #[must_use]
    pub const fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }
}

impl Default for FileContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FileContextError {
    Empty,
    TooLarge { size: usize, max: usize },
}

impl fmt::Display for FileContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "file content is empty"),
            Self::TooLarge { size, max } => {
                write!(f, "file is {size} bytes, larger than the {max} byte limit")
            }
        }
    }
}

impl Error for FileContextError {}

/// Acknowledgement for an uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReceipt {
    pub id: Uuid,
    pub filename: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<String>,
}

/// Listing entry for a stored file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub index: usize,
    pub id: Uuid,
    pub filename: String,
    pub size: usize,
    pub received_at: DateTime<Utc>,
}

/// Outcome of a term search over the stored files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSearch {
    NoFiles,
    Matches(Vec<usize>),
}

struct StoredFile {
    id: Uuid,
    filename: String,
    content: Vec<u8>,
    received_at: DateTime<Utc>,
}

/// Uploaded files shared by every MCP session.
///
/// Oldest files are evicted once `max_files` is reached; a zero limit
/// behaves as one.
#[derive(Clone)]
pub struct FileContext {
    files: Arc<RwLock<VecDeque<StoredFile>>>,
    config: FileContextConfig,
}

impl FileContext {
    #[must_use]
    pub fn new(config: FileContextConfig) -> Self {
        Self {
            files: Arc::new(RwLock::new(VecDeque::new())),
            config,
        }
    }

    /// Stores a file, evicting the oldest one when the context is full.
    ///
    /// # Errors
    /// Returns `FileContextError` if the content is empty or over the size limit.
    pub async fn add(
        &self,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<FileReceipt, FileContextError> {
        if content.is_empty() {
            return Err(FileContextError::Empty);
        }
        if content.len() > self.config.max_file_bytes {
            return Err(FileContextError::TooLarge {
                size: content.len(),
                max: self.config.max_file_bytes,
            });
        }

        let stored = StoredFile {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            content,
            received_at: Utc::now(),
        };
        let receipt = FileReceipt {
            id: stored.id,
            filename: stored.filename.clone(),
            size: stored.content.len(),
            evicted: None,
        };

        let mut files = self.files.write().await;
        let mut evicted = None;
        if files.len() >= self.config.max_files.max(1) {
            evicted = files.pop_front().map(|file| file.filename);
        }
        files.push_back(stored);
        Ok(FileReceipt { evicted, ..receipt })
    }

    /// Returns the indexes of files whose text contains `term`.
    pub async fn search(&self, term: &str) -> FileSearch {
        let files = self.files.read().await;
        if files.is_empty() {
            return FileSearch::NoFiles;
        }
        let matches = files
            .iter()
            .enumerate()
            .filter(|(_, file)| String::from_utf8_lossy(&file.content).contains(term))
            .map(|(index, _)| index)
            .collect();
        FileSearch::Matches(matches)
    }

    pub async fn list(&self) -> Vec<FileSummary> {
        let files = self.files.read().await;
        files
            .iter()
            .enumerate()
            .map(|(index, file)| FileSummary {
                index,
                id: file.id,
                filename: file.filename.clone(),
                size: file.content.len(),
                received_at: file.received_at,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}
