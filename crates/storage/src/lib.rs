// Copyright The Strata Dataflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Local filesystem storage backend.
//!
//! Defines the byte-stream boundary contract every storage plugin honors:
//! validated roots, relative `/`-separated storage paths that cannot escape
//! them, metadata and listing operations, exact-range chunk reads, and
//! streaming read/write as pipeline stages whose IO completions land on
//! the pipeline's event loop.
//!
//! Errors use the platform taxonomy from `strata-pipeline` and always
//! carry the storage key and the offending path.

pub mod local;
pub mod stream;

pub use local::{FileStat, FileType, ListOptions, LocalFileStorage};
pub use stream::{FileByteSink, FileByteSource};
