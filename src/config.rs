//! Decode-time configuration: which values to extract and which on-disk
//! table dialect the injected [`crate::tables::TableProvider`] understands.

use crate::descriptor::Descriptor;

/// Which occurrences of which descriptors to extract during the data pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Extract every element, inside and outside replication loops.
    #[default]
    All,
    /// Extract only elements outside any replication loop.
    OutsideLoops,
    /// Extract only the named descriptors, wherever they occur.
    Only(Vec<Descriptor>),
}

impl ReadMode {
    /// Whether an occurrence at `node_id` (`0` = outside any loop) carrying
    /// descriptor `d` should be extracted under this mode. `Only` restricts
    /// in-loop occurrences to the named descriptors but never drops an
    /// outside-loop scalar, so its `scalars` output always matches `All`'s.
    pub fn admits(&self, d: Descriptor, node_id: usize) -> bool {
        match self {
            ReadMode::All => true,
            ReadMode::OutsideLoops => node_id == 0,
            ReadMode::Only(wanted) => node_id == 0 || wanted.contains(&d),
        }
    }
}

/// The on-disk dialect a [`crate::tables::TableProvider`] implementation parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// ECMWF `bufrdc` flat-file tables.
    Bufrdc,
    /// ecCodes table directories.
    Eccodes,
    /// DWD `libdwd` table format.
    Libdwd,
}

/// Top-level knobs controlling a single decode. The core never interprets
/// `table_path`/`table_type` itself — table-file parsing is out of scope
/// (spec.md §1, §6) — it only passes them through to whatever
/// [`crate::tables::TableProvider`] the caller injects.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Which elements to extract in the data pass.
    pub read_mode: ReadMode,
    /// Filesystem root the table loader resolves table files under.
    pub table_path: Option<std::path::PathBuf>,
    /// Dialect of table files found under `table_path`.
    pub table_type: TableFormat,
    /// Whether to verify the Section 5 `"7777"` end marker.
    pub verify_section5: bool,
}

impl DecodeConfig {
    /// A config reading everything, pointed at `table_path` in the given dialect.
    pub fn new(table_path: impl Into<std::path::PathBuf>, table_type: TableFormat) -> Self {
        Self {
            read_mode: ReadMode::All,
            table_path: Some(table_path.into()),
            table_type,
            verify_section5: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_loops_mode_rejects_loop_occurrences() {
        let mode = ReadMode::OutsideLoops;
        let d = Descriptor::from_code(2001);
        assert!(mode.admits(d, 0));
        assert!(!mode.admits(d, 1));
    }

    #[test]
    fn only_mode_restricts_in_loop_occurrences_to_named_descriptors() {
        let mode = ReadMode::Only(vec![Descriptor::from_code(2001)]);
        assert!(mode.admits(Descriptor::from_code(2001), 5));
        assert!(!mode.admits(Descriptor::from_code(2002), 5));
    }

    #[test]
    fn only_mode_admits_every_outside_loop_scalar() {
        let mode = ReadMode::Only(vec![Descriptor::from_code(2001)]);
        assert!(mode.admits(Descriptor::from_code(2002), 0));
    }
}
