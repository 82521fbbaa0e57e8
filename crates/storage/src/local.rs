// SPDX-License-Identifier: Apache-2.0

//! Local filesystem storage.
//!
//! A storage instance wraps a validated root directory. Storage paths are
//! relative, `/`-separated and may not escape the root; every operation
//! re-validates the path it is given, so a bad key can name a wrong file
//! but never a file outside the root.

use crate::stream::{FileByteSink, FileByteSource};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use strata_pipeline::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// The kind of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// Metadata for one storage entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// The entry's storage path, relative to the root.
    pub storage_path: String,
    /// The last path segment.
    pub file_name: String,
    /// File or directory.
    pub file_type: FileType,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Modification time, when the filesystem provides one.
    pub mtime: Option<SystemTime>,
}

/// Options for [`LocalFileStorage::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Return only entries with a storage path strictly after this key.
    pub start_after: Option<String>,
    /// Cap the number of entries returned.
    pub max_keys: Option<usize>,
}

/// A storage instance over a process-local directory tree.
pub struct LocalFileStorage {
    storage_key: String,
    root: PathBuf,
    read_only: bool,
}

impl LocalFileStorage {
    /// Opens a storage instance, validating the root directory.
    ///
    /// # Errors
    ///
    /// Returns a startup error when the root is missing, is not a
    /// directory, or is not writable for a writable instance.
    pub fn new(
        storage_key: impl Into<String>,
        root: impl Into<PathBuf>,
        read_only: bool,
    ) -> Result<Self, Error> {
        let storage_key = storage_key.into();
        let root = root.into();

        let metadata = std::fs::metadata(&root).map_err(|error| {
            Error::startup(format!(
                "Storage root [{}] is not accessible for storage key [{storage_key}]: {error}",
                root.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(Error::startup(format!(
                "Storage root [{}] is not a directory for storage key [{storage_key}]",
                root.display()
            )));
        }
        if !read_only && metadata.permissions().readonly() {
            return Err(Error::startup(format!(
                "Storage root [{}] is not writable for storage key [{storage_key}]",
                root.display()
            )));
        }

        Ok(LocalFileStorage {
            storage_key,
            root,
            read_only,
        })
    }

    /// The logical storage key used in error messages.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    fn error(&self, operation: &str, path: &str, message: impl Into<String>) -> Error {
        Error::Storage {
            key: format!("{}:{operation}", self.storage_key),
            path: path.to_owned(),
            message: message.into(),
        }
    }

    fn check_writable(&self, operation: &str, path: &str) -> Result<(), Error> {
        if self.read_only {
            return Err(self.error(operation, path, "Storage instance is read-only"));
        }
        Ok(())
    }

    /// Validates a storage path and resolves it under the root.
    fn resolve(&self, operation: &str, storage_path: &str) -> Result<PathBuf, Error> {
        if storage_path.is_empty() {
            return Err(self.error(operation, storage_path, "Storage path is empty"));
        }
        if storage_path.starts_with('/') || storage_path.contains('\\') {
            return Err(self.error(operation, storage_path, "Storage path must be relative"));
        }
        let mut resolved = self.root.clone();
        for segment in storage_path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(self.error(
                    operation,
                    storage_path,
                    "Storage path contains an invalid segment",
                ));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    /// True if the path names an existing entry of any kind.
    ///
    /// # Errors
    ///
    /// Returns a storage error for invalid paths or IO failures.
    pub async fn exists(&self, storage_path: &str) -> Result<bool, Error> {
        let absolute = self.resolve("exists", storage_path)?;
        Ok(tokio::fs::metadata(&absolute).await.is_ok())
    }

    /// True if the path names an existing directory.
    ///
    /// # Errors
    ///
    /// Returns a storage error for invalid paths or IO failures.
    pub async fn dir_exists(&self, storage_path: &str) -> Result<bool, Error> {
        let absolute = self.resolve("dir_exists", storage_path)?;
        match tokio::fs::metadata(&absolute).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(_) => Ok(false),
        }
    }

    /// Metadata for one entry.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the entry does not exist.
    pub async fn stat(&self, storage_path: &str) -> Result<FileStat, Error> {
        let absolute = self.resolve("stat", storage_path)?;
        let metadata = tokio::fs::metadata(&absolute)
            .await
            .map_err(|error| self.error("stat", storage_path, error.to_string()))?;
        Ok(self.stat_of(storage_path, &absolute, &metadata))
    }

    fn stat_of(
        &self,
        storage_path: &str,
        absolute: &Path,
        metadata: &std::fs::Metadata,
    ) -> FileStat {
        let file_name = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| storage_path.to_owned());
        FileStat {
            storage_path: storage_path.to_owned(),
            file_name,
            file_type: if metadata.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            },
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mtime: metadata.modified().ok(),
        }
    }

    /// Lists a directory in lexicographic storage-path order.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the path is not a listable directory.
    pub async fn list(
        &self,
        storage_path: &str,
        options: &ListOptions,
    ) -> Result<Vec<FileStat>, Error> {
        let absolute = self.resolve("list", storage_path)?;

        let mut entries = Vec::new();
        let mut pending: Vec<(String, PathBuf)> = vec![(storage_path.to_owned(), absolute)];

        while let Some((prefix, dir)) = pending.pop() {
            let mut reader = tokio::fs::read_dir(&dir)
                .await
                .map_err(|error| self.error("list", &prefix, error.to_string()))?;
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|error| self.error("list", &prefix, error.to_string()))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_path = format!("{prefix}/{name}");
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|error| self.error("list", &child_path, error.to_string()))?;
                if metadata.is_dir() && options.recursive {
                    pending.push((child_path.clone(), entry.path()));
                }
                entries.push(self.stat_of(&child_path, &entry.path(), &metadata));
            }
        }

        entries.sort_by(|left, right| left.storage_path.cmp(&right.storage_path));
        if let Some(start_after) = &options.start_after {
            entries.retain(|entry| entry.storage_path.as_str() > start_after.as_str());
        }
        if let Some(max_keys) = options.max_keys {
            entries.truncate(max_keys);
        }
        Ok(entries)
    }

    /// Creates a directory; with `recursive`, creates missing parents.
    ///
    /// # Errors
    ///
    /// Returns a storage error in read-only mode or on IO failure.
    pub async fn mkdir(&self, storage_path: &str, recursive: bool) -> Result<(), Error> {
        self.check_writable("mkdir", storage_path)?;
        let absolute = self.resolve("mkdir", storage_path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&absolute).await
        } else {
            tokio::fs::create_dir(&absolute).await
        };
        result.map_err(|error| self.error("mkdir", storage_path, error.to_string()))
    }

    /// Deletes a single file.
    ///
    /// # Errors
    ///
    /// Returns a storage error in read-only mode, for directories, or on
    /// IO failure.
    pub async fn delete_file(&self, storage_path: &str) -> Result<(), Error> {
        self.check_writable("delete_file", storage_path)?;
        let absolute = self.resolve("delete_file", storage_path)?;
        tokio::fs::remove_file(&absolute)
            .await
            .map_err(|error| self.error("delete_file", storage_path, error.to_string()))
    }

    /// Deletes a directory tree, children before parents.
    ///
    /// # Errors
    ///
    /// Returns a storage error in read-only mode or on IO failure.
    pub async fn delete_dir(&self, storage_path: &str) -> Result<(), Error> {
        self.check_writable("delete_dir", storage_path)?;
        let absolute = self.resolve("delete_dir", storage_path)?;
        tokio::fs::remove_dir_all(&absolute)
            .await
            .map_err(|error| self.error("delete_dir", storage_path, error.to_string()))
    }

    /// Reads exactly `size` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// A read past the end of the object is a storage error, never a
    /// short buffer.
    pub async fn read_chunk(
        &self,
        storage_path: &str,
        offset: u64,
        size: usize,
    ) -> Result<Bytes, Error> {
        let absolute = self.resolve("read_chunk", storage_path)?;
        let mut file = tokio::fs::File::open(&absolute)
            .await
            .map_err(|error| self.error("read_chunk", storage_path, error.to_string()))?;
        let _ = file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|error| self.error("read_chunk", storage_path, error.to_string()))?;

        let mut buffer = vec![0u8; size];
        match file.read_exact(&mut buffer).await {
            Ok(_) => Ok(Bytes::from(buffer)),
            Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => Err(self.error(
                "read_chunk",
                storage_path,
                format!("Requested range is beyond the end of the object (object too small): offset {offset}, size {size}"),
            )),
            Err(error) => Err(self.error("read_chunk", storage_path, error.to_string())),
        }
    }

    /// Creates a pipeline source streaming the file's bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error for invalid paths.
    pub fn read_stream(&self, storage_path: &str) -> Result<FileByteSource, Error> {
        let absolute = self.resolve("read_stream", storage_path)?;
        Ok(FileByteSource::new(
            self.storage_key.clone(),
            storage_path.to_owned(),
            absolute,
        ))
    }

    /// Creates a pipeline sink writing the stream to the file, creating
    /// parent directories as needed. A terminated write removes the
    /// partial file.
    ///
    /// # Errors
    ///
    /// Returns a storage error for invalid paths or in read-only mode.
    pub fn write_stream(&self, storage_path: &str) -> Result<FileByteSink, Error> {
        self.check_writable("write_stream", storage_path)?;
        let absolute = self.resolve("write_stream", storage_path)?;
        Ok(FileByteSink::new(
            self.storage_key.clone(),
            storage_path.to_owned(),
            absolute,
        ))
    }
}
