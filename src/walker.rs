//! The structural walker: a recursive descent over the expanded descriptor
//! list that produces the replication tree and the effective-parameter
//! table `E`, advancing a bit cursor in lock-step with Table C operators.
//!
//! This is the central algorithm described in spec.md §4.3. It performs a
//! single pass; the value extractor (`crate::extract`) performs the data
//! pass using the tree and `E` this module produces.

use std::ops::Range;

use tracing::debug;

use crate::bitbuffer::BitBuffer;
use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::operator::{apply_operator, OperatorState, RedefMode};
use crate::tables::{ElementType, Tables};

/// A node in the replication tree. Node `0` in a [`ReplicationTree`] is
/// always the (synthetic) root, representing "outside any replication".
#[derive(Debug, Clone)]
pub struct ReplicationNode {
    /// Start of this node's descriptor span in the expanded list (inclusive).
    pub d_lo: usize,
    /// End of this node's descriptor span in the expanded list (exclusive).
    pub d_hi: usize,
    /// Number of iterations. `1` for the root.
    pub n_it: u64,
    /// Width in bits of the delayed-count field, `0` if non-delayed.
    pub w_delay: u32,
    /// Bit offset where this node's single walked iteration starts, relative
    /// to the start of one iteration of its parent. Absolute for the root.
    pub start_bit: u64,
    /// Bits consumed by one iteration of this node.
    pub bits_per_it: u64,
    /// Arena index of the parent node, `None` for the root.
    pub parent: Option<usize>,
    /// Arena indices of immediate child replication nodes.
    pub children: Vec<usize>,
}

/// The full replication tree for one message, stored as a flat arena so that
/// ancestor chains can be walked without borrowing headaches.
#[derive(Debug, Clone)]
pub struct ReplicationTree {
    nodes: Vec<ReplicationNode>,
}

impl ReplicationTree {
    /// The root node (outside any replication).
    pub fn root(&self) -> &ReplicationNode {
        &self.nodes[0]
    }

    /// Look up a node by arena index.
    pub fn node(&self, id: usize) -> &ReplicationNode {
        &self.nodes[id]
    }

    /// Number of nodes in the arena, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the tree has no nodes besides the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Per-iteration bit strides for every loop enclosing `node_id`,
    /// outermost first. Empty if `node_id` is the root.
    pub fn stride_chain(&self, node_id: usize) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut cur = node_id;
        while cur != 0 {
            chain.push(self.nodes[cur].bits_per_it);
            cur = self.nodes[cur].parent.expect("non-root node always has a parent");
        }
        chain.reverse();
        chain
    }

    /// Iteration counts for every loop enclosing `node_id`, outermost first.
    /// Empty if `node_id` is the root.
    pub fn n_it_chain(&self, node_id: usize) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut cur = node_id;
        while cur != 0 {
            chain.push(self.nodes[cur].n_it);
            cur = self.nodes[cur].parent.expect("non-root node always has a parent");
        }
        chain.reverse();
        chain
    }

    /// The 1-based index of the root-level ("base") loop enclosing `node_id`,
    /// or `None` if `node_id` is the root itself.
    pub fn base_loop_index(&self, node_id: usize) -> Option<usize> {
        if node_id == 0 {
            return None;
        }
        let mut cur = node_id;
        while self.nodes[cur].parent != Some(0) {
            cur = self.nodes[cur].parent.expect("non-root node always has a parent");
        }
        self.nodes[0].children.iter().position(|&c| c == cur).map(|i| i + 1)
    }
}

/// The operator-state snapshot recorded for one element-descriptor
/// occurrence, per spec.md §3 ("Effective-parameter table").
#[derive(Debug, Clone)]
pub struct EffectiveParams {
    /// Effective width in bits.
    pub width: u32,
    /// Effective decimal scale.
    pub scale: i32,
    /// Effective reference value.
    pub refval: i64,
    /// Semantic type, from Table B.
    pub typ: ElementType,
    /// Absolute bit offset used for this occurrence during the single
    /// structurally-walked iteration of its enclosing loop (or the only
    /// iteration, if outside any loop).
    pub recorded_offset: u64,
    /// Arena index of the innermost replication node containing this
    /// occurrence; `0` (the root) if outside any loop.
    pub node: usize,
}

/// Output of the structural walk: the replication tree and the
/// per-occurrence effective-parameter table, indexed by position in the
/// expanded descriptor list (`None` for replication headers, operators,
/// delayed-count descriptors, and elements consumed while redefining a
/// reference value).
pub struct WalkResult {
    /// The replication tree.
    pub tree: ReplicationTree,
    /// Effective parameters, one slot per expanded-descriptor-list position.
    pub params: Vec<Option<EffectiveParams>>,
}

struct Walker<'d, 'b> {
    expanded: &'d [Descriptor],
    bits: &'b BitBuffer<'b>,
    tables: &'d Tables,
    tree: ReplicationTree,
    params: Vec<Option<EffectiveParams>>,
}

/// Run the structural walk described in spec.md §4.3.
pub fn walk(
    expanded: &[Descriptor],
    bits: &BitBuffer,
    tables: &Tables,
    mut state: OperatorState,
) -> Result<WalkResult, DecodeError> {
    let root = ReplicationNode {
        d_lo: 0,
        d_hi: expanded.len(),
        n_it: 1,
        w_delay: 0,
        start_bit: 32,
        bits_per_it: 0,
        parent: None,
        children: Vec::new(),
    };
    let mut walker = Walker {
        expanded,
        bits,
        tables,
        tree: ReplicationTree { nodes: vec![root] },
        params: vec![None; expanded.len()],
    };

    let mut cursor: u64 = 32;
    walker.walk_range(0..expanded.len(), &mut cursor, 32, &mut state, 0)?;
    walker.tree.nodes[0].bits_per_it = cursor - 32;

    Ok(WalkResult { tree: walker.tree, params: walker.params })
}

impl<'d, 'b> Walker<'d, 'b> {
    /// Process the descriptors in `range`, which belong to the single
    /// structurally-walked iteration of `node_id` (`0` for the root level).
    /// `level_origin` is the absolute bit offset at which that iteration began.
    fn walk_range(
        &mut self,
        range: Range<usize>,
        cursor: &mut u64,
        level_origin: u64,
        state: &mut OperatorState,
        node_id: usize,
    ) -> Result<(), DecodeError> {
        let mut i = range.start;
        while i < range.end {
            let d = self.expanded[i];
            match d.kind() {
                DescriptorKind::Element => {
                    self.visit_element(i, d, cursor, state, node_id)?;
                    i += 1;
                }
                DescriptorKind::Replication => {
                    i = self.visit_replication(i, cursor, level_origin, state, node_id)?;
                }
                DescriptorKind::Operator => {
                    apply_operator(state, d)?;
                    i += 1;
                }
                DescriptorKind::Sequence => {
                    unreachable!("F=3 descriptor survived expansion: {d}");
                }
            }
        }
        Ok(())
    }

    fn visit_element(
        &mut self,
        i: usize,
        d: Descriptor,
        cursor: &mut u64,
        state: &mut OperatorState,
        node_id: usize,
    ) -> Result<(), DecodeError> {
        match state.redef_mode() {
            RedefMode::Off => {
                let elem = self.tables.element(d)?;
                if node_id != 0 && elem.typ == ElementType::String {
                    return Err(DecodeError::at("section4", DecodeErrorKind::UnsupportedStringInLoop(d)));
                }
                let width = state.effective_width(elem.width);
                self.params[i] = Some(EffectiveParams {
                    width,
                    scale: state.effective_scale(elem.scale),
                    refval: state.effective_refval(d.code(), elem.refval),
                    typ: elem.typ,
                    recorded_offset: *cursor,
                    node: node_id,
                });
                *cursor += width as u64;
            }
            RedefMode::On(w) => {
                let value = self.bits.read_i("section4", *cursor, w)?;
                state.set_refval_override(d.code(), value);
                *cursor += w as u64;
            }
        }
        Ok(())
    }

    /// Handle an F=1 descriptor at position `i`; returns the next index to
    /// resume the caller's loop at.
    fn visit_replication(
        &mut self,
        i: usize,
        cursor: &mut u64,
        level_origin: u64,
        state: &mut OperatorState,
        node_id: usize,
    ) -> Result<usize, DecodeError> {
        let d = self.expanded[i];
        let span = d.replication_span() as usize;

        let (body_start, w_delay, n_it) = if d.is_delayed_replication() {
            let count_descr = self.expanded[i + 1];
            let count_elem = self.tables.element(count_descr)?;
            let w_delay = count_elem.width;
            let n_it = self.bits.read_u("section4", *cursor, w_delay)?;
            *cursor += w_delay as u64;
            (i + 2, w_delay, n_it)
        } else {
            (i + 1, 0, d.y() as u64)
        };
        let body_hi = body_start + span;
        let local_start = *cursor - level_origin;

        let new_id = self.tree.nodes.len();
        self.tree.nodes.push(ReplicationNode {
            d_lo: body_start,
            d_hi: body_hi,
            n_it,
            w_delay,
            start_bit: local_start,
            bits_per_it: 0,
            parent: Some(node_id),
            children: Vec::new(),
        });
        self.tree.nodes[node_id].children.push(new_id);

        if n_it == 0 {
            // No iteration exists in the bitstream at all: don't walk the
            // body (there is nothing there to read), and no descendant gets
            // an effective-parameter entry.
            debug!(node = new_id, "zero-iteration replication, skipping body");
            return Ok(body_hi);
        }

        let body_start_cursor = *cursor;
        self.walk_range(body_start..body_hi, cursor, body_start_cursor, state, new_id)?;
        let bits_per_it = *cursor - body_start_cursor;
        self.tree.nodes[new_id].bits_per_it = bits_per_it;
        *cursor += bits_per_it * (n_it - 1);

        debug!(node = new_id, n_it, bits_per_it, "closed replication node");
        Ok(body_hi)
    }
}
