//! The data pass: turn the replication tree and effective-parameter table
//! the structural walker produced into scalar and array values, per
//! spec.md §4.4-4.5.
//!
//! Rectangular regions are never physically materialised as bit-array
//! copies. A loop's single structurally-walked iteration records the
//! absolute bit offset each element occupied; the offset for an arbitrary
//! combination of iteration indices is derived arithmetically from that
//! recorded offset plus the per-loop bit strides (see [`crate::walker::ReplicationTree::stride_chain`]).

use std::collections::HashMap;

use itertools::Itertools;

use crate::bitbuffer::BitBuffer;
use crate::config::ReadMode;
use crate::descriptor::Descriptor;
use crate::error::DecodeError;
use crate::tables::ElementType;
use crate::walker::{EffectiveParams, ReplicationTree};

/// One decoded value, typed by its Table B element type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtractedValue {
    /// The all-ones missing-value sentinel was present.
    Missing,
    /// A whole number (`Integral`, `CodeList`, or `BitFlag` element).
    Integer(i64),
    /// A scaled decimal number (`Floating` element).
    Real(f64),
    /// A character string.
    Text(String),
}

/// A rectangular region of decoded values plus its shape, outermost
/// dimension first, one dimension per enclosing loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NdArray<T> {
    /// Extent along each enclosing loop, outermost first.
    pub shape: Vec<usize>,
    /// Values in row-major order.
    pub data: Vec<T>,
}

impl<T> NdArray<T> {
    fn len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Everything the data pass produced for one message.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutput {
    /// Values recorded outside any replication loop, keyed by position in
    /// the expanded descriptor list.
    pub scalars: HashMap<usize, ExtractedValue>,
    /// Values recorded inside a replication loop, keyed by position in the
    /// expanded descriptor list.
    pub arrays: HashMap<usize, NdArray<ExtractedValue>>,
}

/// Run the data pass over every recorded occurrence in `params`, honouring `mode`.
pub fn extract(
    expanded: &[Descriptor],
    bits: &BitBuffer,
    tree: &ReplicationTree,
    params: &[Option<EffectiveParams>],
    mode: &ReadMode,
) -> Result<ExtractOutput, DecodeError> {
    let mut out = ExtractOutput::default();
    for (i, slot) in params.iter().enumerate() {
        let Some(p) = slot else { continue };
        let d = expanded[i];
        if !mode.admits(d, p.node) {
            continue;
        }
        if p.node == 0 {
            out.scalars.insert(i, read_value(bits, p, p.recorded_offset)?);
        } else {
            out.arrays.insert(i, extract_array(bits, tree, p)?);
        }
    }
    Ok(out)
}

fn extract_array(
    bits: &BitBuffer,
    tree: &ReplicationTree,
    p: &EffectiveParams,
) -> Result<NdArray<ExtractedValue>, DecodeError> {
    let n_it = tree.n_it_chain(p.node);
    let strides = tree.stride_chain(p.node);
    debug_assert_eq!(n_it.len(), strides.len());

    let shape: Vec<usize> = n_it.iter().map(|&n| n as usize).collect();
    let mut array = NdArray { shape: shape.clone(), data: Vec::new() };
    array.data.reserve(array.len());

    let ranges: Vec<std::ops::Range<u64>> = n_it.iter().map(|&n| 0..n).collect();
    for indices in ranges.into_iter().multi_cartesian_product() {
        let delta: u64 = indices.iter().zip(&strides).map(|(idx, stride)| idx * stride).sum();
        array.data.push(read_value(bits, p, p.recorded_offset + delta)?);
    }
    Ok(array)
}

fn read_value(bits: &BitBuffer, p: &EffectiveParams, offset: u64) -> Result<ExtractedValue, DecodeError> {
    if bits.all_ones("section4", offset, p.width)? {
        return Ok(ExtractedValue::Missing);
    }
    match p.typ {
        ElementType::String => Ok(ExtractedValue::Text(bits.read_str("section4", offset, p.width)?)),
        ElementType::Floating => {
            let raw = bits.read_u("section4", offset, p.width)?;
            let value = (raw as f64 + p.refval as f64) * 10f64.powi(-p.scale);
            Ok(ExtractedValue::Real(value))
        }
        ElementType::Integral | ElementType::CodeList | ElementType::BitFlag => {
            let raw = bits.read_u("section4", offset, p.width)?;
            Ok(ExtractedValue::Integer(raw as i64 + p.refval))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::operator::OperatorState;
    use crate::tables::{TableBElement, Tables};
    use crate::walker::walk;

    fn elem(code: u32, typ: ElementType, width: u32, scale: i32, refval: i64) -> TableBElement {
        TableBElement {
            code,
            typ,
            unit: String::new(),
            short_name: String::new(),
            long_name: String::new(),
            scale,
            refval,
            width,
        }
    }

    #[test]
    fn scalar_outside_loop_is_recorded_directly() {
        let mut tables = Tables::default();
        tables.tab_b.insert(1001, elem(1001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![Descriptor::from_code(1001)];
        let payload = [0u8, 0, 0, 0, 42];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        assert_eq!(out.scalars[&0], ExtractedValue::Integer(42));
        assert!(out.arrays.is_empty());
    }

    #[test]
    fn all_ones_field_is_missing() {
        let mut tables = Tables::default();
        tables.tab_b.insert(1001, elem(1001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![Descriptor::from_code(1001)];
        let payload = [0u8, 0, 0, 0, 0xff];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        assert_eq!(out.scalars[&0], ExtractedValue::Missing);
    }

    #[test]
    fn floating_element_applies_scale_and_refval() {
        let mut tables = Tables::default();
        tables.tab_b.insert(12_001, elem(12_001, ElementType::Floating, 12, 1, -10));
        let expanded = vec![Descriptor::from_code(12_001)];
        // raw = 150 -> (150 - 10) * 10^-1 = 14.0
        let payload = [0u8, 0, 0, 0, 0b0000_1001, 0b0110_0000];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        match &out.scalars[&0] {
            ExtractedValue::Real(v) => assert!((v - 14.0).abs() < 1e-9),
            other => panic!("expected Real, got {other:?}"),
        }
    }

    #[test]
    fn simple_loop_extracts_one_array_per_iteration() {
        let mut tables = Tables::default();
        tables.tab_b.insert(2001, elem(2001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![Descriptor::new(1, 1, 3), Descriptor::from_code(2001)];
        let payload = [0u8, 0, 0, 0, 10, 20, 30];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        let array = &out.arrays[&1];
        assert_eq!(array.shape, vec![3]);
        assert_eq!(
            array.data,
            vec![ExtractedValue::Integer(10), ExtractedValue::Integer(20), ExtractedValue::Integer(30)]
        );
    }

    #[test]
    fn nested_loop_produces_a_two_dimensional_array() {
        let mut tables = Tables::default();
        tables.tab_b.insert(2001, elem(2001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![
            Descriptor::new(1, 1, 2),
            Descriptor::new(1, 1, 2),
            Descriptor::from_code(2001),
        ];
        let payload = [0u8, 0, 0, 0, 1, 2, 3, 4];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        let array = &out.arrays[&2];
        assert_eq!(array.shape, vec![2, 2]);
        assert_eq!(
            array.data,
            vec![
                ExtractedValue::Integer(1),
                ExtractedValue::Integer(2),
                ExtractedValue::Integer(3),
                ExtractedValue::Integer(4),
            ]
        );
    }

    #[test]
    fn zero_iteration_loop_yields_an_empty_array() {
        let mut tables = Tables::default();
        tables.tab_b.insert(31_001, elem(31_001, ElementType::Integral, 8, 0, 0));
        tables.tab_b.insert(2001, elem(2001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![Descriptor::new(1, 1, 0), Descriptor::from_code(31_001), Descriptor::from_code(2001)];
        let payload = [0u8, 0, 0, 0, 0x00];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::All).unwrap();
        assert!(out.arrays.is_empty());
        assert!(out.scalars.is_empty());
    }

    #[test]
    fn outside_loops_mode_skips_array_occurrences() {
        let mut tables = Tables::default();
        tables.tab_b.insert(1001, elem(1001, ElementType::Integral, 8, 0, 0));
        tables.tab_b.insert(2001, elem(2001, ElementType::Integral, 8, 0, 0));
        let expanded = vec![
            Descriptor::from_code(1001),
            Descriptor::new(1, 1, 2),
            Descriptor::from_code(2001),
        ];
        let payload = [0u8, 0, 0, 0, 1, 2, 3];
        let bits = BitBuffer::new(&payload);
        let result = walk(&expanded, &bits, &tables, OperatorState::default()).unwrap();
        let out = extract(&expanded, &bits, &result.tree, &result.params, &ReadMode::OutsideLoops).unwrap();
        assert_eq!(out.scalars.len(), 1);
        assert!(out.arrays.is_empty());
    }
}
