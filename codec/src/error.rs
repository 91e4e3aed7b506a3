/*!
The primary error type for the `bp6-codec` crate: everything that can go
wrong turning bytes into blocks, or blocks into bytes.
*/

/// Errors raised while parsing or serializing bundle blocks.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An SDNV field inside the block failed to decode.
    #[error(transparent)]
    Sdnv(#[from] crate::sdnv::Error),

    /// The primary block declared a bundle protocol version this codec does not speak.
    #[error("unsupported bundle protocol version {0}")]
    UnsupportedVersion(u8),

    /// The block's self-reported length does not match the bytes actually consumed.
    #[error("block declared length {declared} but {consumed} bytes were consumed")]
    LengthMismatch { declared: u64, consumed: u64 },

    /// The buffer ended before a fixed-size field (not an SDNV) could be read.
    #[error("buffer truncated while reading {0}")]
    Truncated(&'static str),

    /// The caller's output buffer is too small to hold the encoded block.
    #[error("buffer capacity {capacity} is too small for {needed} bytes")]
    BufferTooSmall { capacity: usize, needed: usize },

    /// A reserved or unsupported dictionary length was seen (only compressed, dictionary-less bundles are supported).
    #[error("non-zero dictionary length {0} is unsupported (compressed form only)")]
    DictionaryUnsupported(u64),

    /// A CRC type byte did not match a known variant during a strict decode.
    #[error("unrecognised CRC type {0}")]
    InvalidCrcType(u8),
}

pub type Result<T> = core::result::Result<T, Error>;
