// SPDX-License-Identifier: Apache-2.0

//! Codec configuration.

/// Default number of rows accumulated before a decoder emits a batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Options shared by the text codecs.
#[derive(Clone, Debug)]
pub struct CodecOptions {
    /// Rows per decoded batch.
    pub batch_size: usize,

    /// Whether object-format field names match the schema case-sensitively.
    pub case_sensitive: bool,

    /// Whether CSV carries a header row. Applies symmetrically: the decoder
    /// skips one and the encoder writes one.
    pub csv_header: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            case_sensitive: true,
            csv_header: false,
        }
    }
}
