//! Export/import list construction.
//!
//! The oracle assignment and the scattered records only describe cells that
//! *move*; the cells a rank keeps must be appended to its own import list so
//! that downstream consumers see one complete, sorted inventory of the
//! rank's cells. Both lists are kept sorted by global id, which is the
//! ordering every later stage (halo attachment, interface pairing, local
//! index resolution) assumes.

use crate::partition::{ExportEntry, ImportEntry, Rank};

/// Build the sorted export and import lists for `my_rank`.
///
/// `resident` lists the cells this rank holds before redistribution together
/// with their destination rank (on the root that is every cell; elsewhere it
/// is empty). `received` lists the `(global id, source rank)` records the
/// scatter stage delivered to this rank.
pub fn make_import_export_lists(
    my_rank: Rank,
    resident: &[(usize, Rank)],
    received: &[(usize, Rank)],
) -> (Vec<ExportEntry>, Vec<ImportEntry>) {
    let mut exports: Vec<ExportEntry> = resident
        .iter()
        .filter(|&&(_, to)| to != my_rank)
        .map(|&(global, to)| ExportEntry::owner(global, to))
        .collect();
    exports.sort_by_key(|e| e.global);

    let mut imports: Vec<ImportEntry> = received
        .iter()
        .map(|&(global, from)| ImportEntry::owner(global, from))
        .collect();
    // Self entries: cells that stay put never cross the wire but still
    // belong to the inventory.
    imports.extend(
        resident
            .iter()
            .filter(|&&(_, to)| to == my_rank)
            .map(|&(global, _)| ImportEntry::owner(global, my_rank)),
    );
    imports.sort_by_key(|e| e.global);

    (exports, imports)
}
