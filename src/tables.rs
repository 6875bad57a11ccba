//! In-memory view of BUFR Tables A/B/C/D/CF.
//!
//! This module defines the registry shape and the [`TableProvider`]
//! contract an external loader implements; parsing table files from disk
//! (`bufrdc`/`eccodes`/`libdwd` formats) is out of scope for this crate —
//! see spec.md §1 and §6.

use std::collections::HashMap;

use crate::descriptor::Descriptor;
use crate::error::DecodeError;

/// The semantic type of a Table B element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Decimal value with a nonzero scale.
    Floating,
    /// Decimal value with zero scale.
    Integral,
    /// Character string (CCITT IA5).
    String,
    /// Code table lookup.
    CodeList,
    /// Bit-flag table lookup.
    BitFlag,
}

/// A single Table B entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBElement {
    /// Canonical numeric code.
    pub code: u32,
    /// Semantic type.
    pub typ: ElementType,
    /// Unit string, e.g. `"K"`, `"CODE TABLE"`.
    pub unit: String,
    /// Short (abbreviated) name.
    pub short_name: String,
    /// Long (descriptive) name.
    pub long_name: String,
    /// Decimal scale. Ignored for `String`-typed elements.
    pub scale: i32,
    /// Reference value. Ignored for `String`-typed elements.
    pub refval: i64,
    /// Width in bits. Always positive.
    pub width: u32,
}

/// The in-memory table registry used to decode a single message.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    /// Table A: data-category meanings, keyed by category code.
    pub tab_a: HashMap<u32, String>,
    /// Table B: element definitions, keyed by descriptor code.
    pub tab_b: HashMap<u32, TableBElement>,
    /// Table C: operator names, keyed by descriptor code.
    pub tab_c: HashMap<u32, String>,
    /// Table D: sequence expansions, keyed by descriptor code.
    pub tab_d: HashMap<u32, Vec<Descriptor>>,
    /// Table CF: code/flag table entries, keyed by (descriptor code, value).
    pub tab_cf: HashMap<(u32, u64), String>,
}

impl Tables {
    /// Look up a Table B element by descriptor, failing with `UnknownElement`.
    pub fn element(&self, d: Descriptor) -> Result<&TableBElement, DecodeError> {
        self.tab_b
            .get(&d.code())
            .ok_or_else(|| DecodeError::at("tableB", crate::error::DecodeErrorKind::UnknownElement(d)))
    }

    /// Look up a Table D expansion by descriptor, failing with `UnknownSequence`.
    pub fn sequence(&self, d: Descriptor) -> Result<&[Descriptor], DecodeError> {
        self.tab_d
            .get(&d.code())
            .map(Vec::as_slice)
            .ok_or_else(|| DecodeError::at("tableD", crate::error::DecodeErrorKind::UnknownSequence(d)))
    }

    /// Resolve a code/flag value to its textual meaning, falling back to
    /// `"N/A"` when the table has no entry — mirrors the original
    /// `lookup_codeflag` behaviour for unrecognised values.
    pub fn lookup_codeflag(&self, d: Descriptor, value: u64) -> Option<&str> {
        self.tab_cf.get(&(d.code(), value)).map(String::as_str)
    }
}

/// Identifies which table set a message requires: the six coordinates a
/// BUFR Section 1 can name, plus which on-disk table dialect to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
    /// Master table number.
    pub master: u8,
    /// Master table version.
    pub master_version: u8,
    /// Local table version.
    pub local_version: u8,
    /// Originating centre.
    pub centre: u16,
    /// Originating sub-centre.
    pub sub_centre: u16,
}

/// External contract: given a [`TableKey`], produce a populated [`Tables`].
///
/// Implementations are expected to parse on-disk table files (in the
/// `bufrdc`, `eccodes`, or `libdwd` dialect) and may cache the result
/// keyed by [`TableKey`] themselves; this crate holds no process-wide
/// cache (see DESIGN.md).
pub trait TableProvider {
    /// Load (or fetch from a cache owned by the implementor) the tables
    /// required to decode a message carrying `key`.
    fn load(&self, key: &TableKey) -> Result<Tables, DecodeError>;
}
