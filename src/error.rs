//! Error taxonomy for BUFR decoding.

use thiserror::Error;

use crate::descriptor::Descriptor;

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// Why a feature was rejected as unsupported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedFeatureKind {
    /// Section 4 carries more than one subset.
    #[error("multi-subset Section 4 payloads are not supported")]
    MultiSubset,
    /// The compression flag was set in Section 3.
    #[error("compressed Section 4 payloads are not supported")]
    CompressedSection4,
    /// An F=2 operator outside {2-01, 2-02, 2-03} was encountered.
    #[error("operator {0} is not supported")]
    Operator(Descriptor),
}

/// The kind of failure, independent of where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The `"BUFR"` sentinel was not found, or section boundaries were inconsistent.
    #[error("BUFR magic not found or section boundaries inconsistent")]
    BadMagic,
    /// Edition outside {3, 4}.
    #[error("unsupported BUFR edition {0}")]
    UnsupportedEdition(u8),
    /// A feature this core does not implement.
    #[error(transparent)]
    UnsupportedFeature(#[from] UnsupportedFeatureKind),
    /// A descriptor was not present in Table B.
    #[error("descriptor {0} not found in table B")]
    UnknownElement(Descriptor),
    /// A descriptor was not present in Table D.
    #[error("descriptor {0} not found in table D")]
    UnknownSequence(Descriptor),
    /// A character-string element occurred inside a replication loop.
    #[error("descriptor {0} is a string element inside a replication loop")]
    UnsupportedStringInLoop(Descriptor),
    /// A bit read would exceed the payload.
    #[error("read of {width} bits at offset {offset} exceeds the {total}-bit payload")]
    Truncated {
        /// Absolute bit offset the read started at.
        offset: u64,
        /// Width of the attempted read, in bits.
        width: u32,
        /// Total number of bits available.
        total: u64,
    },
    /// The external table loader reported a fatal failure for Table B or D.
    #[error("failed to load tables: {0}")]
    TableLoad(String),
}

/// A decode failure, annotated with where in the message it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (section {section}, bit {bit_offset:?})")]
pub struct DecodeError {
    /// The underlying failure.
    pub kind: DecodeErrorKind,
    /// Name of the section being processed, e.g. `"section4"`.
    pub section: &'static str,
    /// Absolute bit offset at which the failure was detected, if applicable.
    pub bit_offset: Option<u64>,
}

impl DecodeError {
    /// Build an error located within `section`, with no specific bit offset.
    pub fn at(section: &'static str, kind: impl Into<DecodeErrorKind>) -> Self {
        Self { kind: kind.into(), section, bit_offset: None }
    }

    /// Build an error located within `section` at `bit_offset`.
    pub fn at_bit(section: &'static str, bit_offset: u64, kind: impl Into<DecodeErrorKind>) -> Self {
        Self { kind: kind.into(), section, bit_offset: Some(bit_offset) }
    }
}
