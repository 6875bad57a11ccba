//! Sequence (F=3) expansion: flatten Table D references into the elements,
//! replications and operators they denote.

use tracing::debug;

use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::DecodeError;
use crate::tables::Tables;

/// Repeatedly replace F=3 descriptors with their Table D expansion until
/// none remain. Fails with `UnknownSequence` if a lookup is absent.
///
/// The expansion is not operator-aware: Table C operators are left exactly
/// where they occur and are applied only during the structural walk.
pub fn expand_descriptors(descriptors: &[Descriptor], tables: &Tables) -> Result<Vec<Descriptor>, DecodeError> {
    let mut current = descriptors.to_vec();
    loop {
        let has_sequence = current.iter().any(|d| matches!(d.kind(), DescriptorKind::Sequence));
        if !has_sequence {
            return Ok(current);
        }
        let mut next = Vec::with_capacity(current.len());
        for d in &current {
            if matches!(d.kind(), DescriptorKind::Sequence) {
                let expansion = tables.sequence(*d)?;
                debug!(sequence = %d, count = expansion.len(), "expanding sequence descriptor");
                next.extend_from_slice(expansion);
            } else {
                next.push(*d);
            }
        }
        current = next;
    }
}
