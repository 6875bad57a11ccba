//! Table C operator state: the accumulator mutated by 2-01/2-02/2-03
//! descriptors while the structural walker proceeds.

use std::collections::HashMap;

use crate::descriptor::Descriptor;
use crate::error::{DecodeError, UnsupportedFeatureKind};

/// Whether the next element descriptor redefines its reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedefMode {
    /// Elements are decoded normally.
    Off,
    /// The next element's bits are a signed reference-value override of
    /// the given width, not data.
    On(u32),
}

/// Additive width/scale deltas, the reference-value override map, and the
/// current redefinition mode. One instance is threaded through the entire
/// structural walk of a message; `R` is never reset once set (see spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct OperatorState {
    add_width: i32,
    add_scale: i32,
    refval_overrides: HashMap<u32, i64>,
    redef_mode: RedefModeStorage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RedefModeStorage(RedefMode);

impl Default for RedefModeStorage {
    fn default() -> Self {
        Self(RedefMode::Off)
    }
}

impl OperatorState {
    /// Current redefinition mode.
    pub fn redef_mode(&self) -> RedefMode {
        self.redef_mode.0
    }

    /// Record a reference-value override for `code`, absorbed at walk time
    /// from the bits just read for a 2-03-redefined element.
    pub fn set_refval_override(&mut self, code: u32, value: i64) {
        self.refval_overrides.insert(code, value);
    }

    /// Effective width for a Table B entry whose nominal width is `base_width`.
    pub fn effective_width(&self, base_width: u32) -> u32 {
        (base_width as i64 + self.add_width as i64).max(0) as u32
    }

    /// Effective scale for a Table B entry whose nominal scale is `base_scale`.
    pub fn effective_scale(&self, base_scale: i32) -> i32 {
        base_scale + self.add_scale
    }

    /// Effective reference value for `code`, given its Table B nominal value.
    pub fn effective_refval(&self, code: u32, base_refval: i64) -> i64 {
        self.refval_overrides.get(&code).copied().unwrap_or(base_refval)
    }

    /// Apply an F=2 operator descriptor, mutating width delta, scale delta,
    /// or redefinition mode. Any operator outside {2-01, 2-02, 2-03} is
    /// reported as an unsupported feature.
    pub fn apply(&mut self, d: Descriptor) -> Result<(), UnsupportedFeatureKind> {
        match d.x() {
            1 => {
                self.add_width = if d.y() == 0 { 0 } else { d.y() as i32 - 128 };
                Ok(())
            }
            2 => {
                self.add_scale = if d.y() == 0 { 0 } else { d.y() as i32 - 128 };
                Ok(())
            }
            3 => {
                self.redef_mode = RedefModeStorage(if d.y() == 255 {
                    RedefMode::Off
                } else {
                    RedefMode::On(d.y() as u32)
                });
                Ok(())
            }
            _ => Err(UnsupportedFeatureKind::Operator(d)),
        }
    }
}

/// Apply `d` to `state`, translating an unsupported operator into a located [`DecodeError`].
pub fn apply_operator(state: &mut OperatorState, d: Descriptor) -> Result<(), DecodeError> {
    state.apply(d).map_err(|kind| DecodeError::at("section4", kind))
}
