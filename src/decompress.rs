//! Outer-envelope decompression.
//!
//! Some BUFR distributors wrap whole messages in bz2. Decompressing bz2 is
//! out of scope for this crate (spec.md §1 Non-goals); instead callers
//! inject a [`Decompressor`] when their messages need it. Detection of the
//! bz2 magic is provided so callers can choose not to call one unnecessarily.

use crate::error::{DecodeError, DecodeErrorKind, UnsupportedFeatureKind};

const BZ2_MAGIC: &[u8] = b"BZh";

/// An external collaborator that turns compressed bytes into a single BUFR
/// message. Implementations typically wrap a crate such as `bzip2`.
pub trait Decompressor {
    /// Decompress `input`, returning the bytes of one BUFR message.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

/// `true` if `bytes` begins with the bz2 stream magic (`"BZh"`).
pub fn looks_bz2_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(BZ2_MAGIC)
}

/// Decompress `bytes` with `decompressor` if it looks bz2-compressed,
/// otherwise return it unchanged. Fails with `UnsupportedFeature` if the
/// bytes look compressed but no decompressor was provided.
pub fn maybe_decompress(bytes: &[u8], decompressor: Option<&dyn Decompressor>) -> Result<Vec<u8>, DecodeError> {
    if !looks_bz2_compressed(bytes) {
        return Ok(bytes.to_vec());
    }
    match decompressor {
        Some(d) => d.decompress(bytes),
        None => Err(DecodeError::at(
            "section0",
            DecodeErrorKind::UnsupportedFeature(UnsupportedFeatureKind::CompressedSection4),
        )),
    }
}
