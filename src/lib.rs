//! Descriptor-driven decoder for WMO BUFR Section 4 data.
//!
//! The entry point is [`decode`]: given one already-framed BUFR message and
//! a populated [`tables::Tables`] registry, it runs Section 0/1/3 framing,
//! expands Table D sequences, performs the two-pass structural walk and
//! value extraction over Section 4, and optionally checks the Section 5
//! end marker.
//!
//! Table loading from disk is an external contract ([`tables::TableProvider`]);
//! this crate holds no process-wide table cache.

#![warn(missing_docs)]

pub mod bitbuffer;
pub mod config;
pub mod decompress;
pub mod descriptor;
pub mod error;
pub mod expand;
pub mod extract;
pub mod operator;
pub mod sections;
pub mod tables;
pub mod walker;

use std::collections::HashMap;

use tracing::error;

pub use crate::config::{DecodeConfig, ReadMode, TableFormat};
pub use crate::descriptor::{Descriptor, DescriptorKind};
pub use crate::error::{DecodeError, DecodeErrorKind, Result, UnsupportedFeatureKind};
pub use crate::extract::{ExtractedValue, NdArray};
pub use crate::sections::{BufrDateTime, BufrMetadata};
pub use crate::tables::{TableKey, TableProvider, Tables};

use crate::decompress::{maybe_decompress, Decompressor};
use crate::descriptor::DescriptorKind as DKind;
use crate::expand::expand_descriptors;
use crate::extract::extract;
use crate::operator::OperatorState;
use crate::sections::{parse_section0, parse_section1, parse_section3, parse_section4, split_sections, verify_section5, Section3Header};
use crate::walker::walk;

/// Everything produced by decoding one message.
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    /// Section 1 metadata.
    pub metadata: BufrMetadata,
    /// Section 3 framing (subset count, observed/compressed flags).
    pub section3: Section3Header,
    /// Human-readable name for every descriptor in the expanded list, in
    /// order, falling back to the descriptor's numeric form when the
    /// registry has no name for it.
    pub full_description: Vec<String>,
    /// Values recorded outside any replication loop, keyed by position in
    /// the expanded descriptor list.
    pub scalars: HashMap<usize, ExtractedValue>,
    /// Values recorded inside a replication loop, keyed by position in the
    /// expanded descriptor list.
    pub arrays: HashMap<usize, NdArray<ExtractedValue>>,
}

/// Decode one BUFR message.
///
/// `message` is the raw message bytes, `"BUFR"` through `"7777"`,
/// optionally bz2-compressed (pass a [`Decompressor`] to handle that).
/// `tables` must already carry every Table B/C/D entry the message's
/// descriptor list can reach; load it with a [`TableProvider`] keyed by the
/// [`TableKey`] read from Section 1, or from a fixed table set.
pub fn decode(
    message: &[u8],
    tables: &Tables,
    config: &DecodeConfig,
    decompressor: Option<&dyn Decompressor>,
) -> Result<DecodeOutput> {
    let message = maybe_decompress(message, decompressor)?;
    let sections = split_sections(&message)?;

    let header0 = parse_section0(sections.section0)?;
    let metadata = parse_section1(sections.section1, header0.edition, header0.total_length)?;
    let (section3_header, descriptors) = parse_section3(sections.section3)?;
    let expanded = expand_descriptors(&descriptors, tables)?;

    let section4_bytes = parse_section4(sections.section4)?;
    let bits = bitbuffer::BitBuffer::new(section4_bytes);
    let walk_result = walk(&expanded, &bits, tables, OperatorState::default()).map_err(|e| {
        error!(error = %e, "structural walk failed");
        e
    })?;
    let extracted = extract(&expanded, &bits, &walk_result.tree, &walk_result.params, &config.read_mode)?;

    if config.verify_section5 {
        verify_section5(sections.section5)?;
    }

    Ok(DecodeOutput {
        metadata,
        section3: section3_header,
        full_description: describe(&expanded, tables),
        scalars: extracted.scalars,
        arrays: extracted.arrays,
    })
}

/// Render a human-readable name for every descriptor in `expanded`,
/// falling back to its numeric form when `tables` has no name for it.
pub fn describe(expanded: &[Descriptor], tables: &Tables) -> Vec<String> {
    expanded
        .iter()
        .map(|d| match d.kind() {
            DKind::Element => tables
                .tab_b
                .get(&d.code())
                .map(|e| format!("{d} {}", e.short_name))
                .unwrap_or_else(|| d.to_string()),
            DKind::Operator => tables
                .tab_c
                .get(&d.code())
                .map(|name| format!("{d} {name}"))
                .unwrap_or_else(|| d.to_string()),
            _ => d.to_string(),
        })
        .collect()
}
