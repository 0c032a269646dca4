//! Gap allocator
//!
//! Scans the offset-sorted Block-Table for free intervals between the end
//! of the catalog region, the existing blocks, and the end of the
//! container, and picks one under a first-fit-best-fit hybrid:
//!
//! - if any gap is large enough for the whole request, the smallest such
//!   gap wins (best fit; an exact-size gap therefore always wins),
//! - otherwise the largest gap wins, so the caller can place a truncated
//!   fragment there and retry with the smaller remainder.

use crate::catalog::Catalog;
use crate::marker;

/// A free interval selected for a new block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// First byte of the gap.
    pub offset: u64,
    /// Gap length in bytes.
    pub length: u64,
    /// Block-Table index where a block placed here must be inserted to
    /// preserve offset ordering.
    pub insert_at: usize,
}

/// Select a gap for a block of up to `required` bytes (markers included).
///
/// Gaps too small to hold both markers plus one payload byte are never
/// returned. `None` means no usable gap exists at all.
pub fn find_gap(catalog: &Catalog, required: u64) -> Option<Gap> {
    let mut best_fit: Option<Gap> = None;
    let mut largest: Option<Gap> = None;

    let mut prev_end = Catalog::data_start();
    for i in 0..=catalog.blocks.len() {
        let gap_end = match catalog.blocks.get(i) {
            Some(block) => block.offset,
            None => catalog.vault_size,
        };
        let length = gap_end.saturating_sub(prev_end);
        if let Some(block) = catalog.blocks.get(i) {
            prev_end = block.end();
        }
        if !marker::holds_payload(length) {
            continue;
        }

        let gap = Gap {
            offset: gap_end - length,
            length,
            insert_at: i,
        };
        if length >= required && best_fit.map_or(true, |b| length < b.length) {
            best_fit = Some(gap);
        }
        if largest.map_or(true, |l| length > l.length) {
            largest = Some(gap);
        }
    }

    let chosen = best_fit.or(largest);
    if let Some(gap) = chosen {
        tracing::debug!(
            offset = gap.offset,
            length = gap.length,
            required,
            "gap selected"
        );
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BlockEntry, Catalog, FileEntry, FRAGMENTS_PER_FILE};

    const START: u64 = Catalog::data_start();

    /// Catalog with blocks at the given (offset, length) pairs, all owned
    /// by one synthetic file per block so validation stays happy.
    fn catalog_with_blocks(vault_size: u64, blocks: &[(u64, u64)]) -> Catalog {
        let mut catalog = Catalog::new(vault_size);
        let mut sorted = blocks.to_vec();
        sorted.sort_by_key(|(offset, _)| *offset);
        for (i, (offset, length)) in sorted.iter().enumerate() {
            catalog.insert_file(FileEntry {
                name: format!("file-{:03}", i),
                size: crate::marker::payload_len(*length),
                mode: 0o644,
                inserted_at: 0,
                fragments: [None; FRAGMENTS_PER_FILE],
            });
        }
        for (i, (offset, length)) in sorted.iter().enumerate() {
            catalog.insert_block(
                i,
                BlockEntry {
                    owner: i as u16,
                    fragment: 0,
                    length: *length,
                    offset: *offset,
                },
            );
        }
        catalog.validate().unwrap();
        catalog
    }

    #[test]
    fn test_empty_vault_single_gap() {
        let catalog = catalog_with_blocks(START + 1000, &[]);
        let gap = find_gap(&catalog, 100).unwrap();
        assert_eq!(gap.offset, START);
        assert_eq!(gap.length, 1000);
        assert_eq!(gap.insert_at, 0);
    }

    #[test]
    fn test_best_fit_prefers_smallest_sufficient() {
        // Gaps: 100 at START, 50 after first block, tail of 500
        let catalog = catalog_with_blocks(
            START + 1000,
            &[(START + 100, 200), (START + 350, 150)],
        );
        let gap = find_gap(&catalog, 40).unwrap();
        assert_eq!(gap.length, 50);
        assert_eq!(gap.offset, START + 300);
        assert_eq!(gap.insert_at, 1);
    }

    #[test]
    fn test_exact_fit_wins() {
        let catalog = catalog_with_blocks(
            START + 1000,
            &[(START + 100, 200), (START + 350, 150)],
        );
        let gap = find_gap(&catalog, 100).unwrap();
        assert_eq!(gap.length, 100);
        assert_eq!(gap.offset, START);
        assert_eq!(gap.insert_at, 0);
    }

    #[test]
    fn test_falls_back_to_largest() {
        let catalog = catalog_with_blocks(
            START + 1000,
            &[(START + 100, 200), (START + 350, 150)],
        );
        // Nothing holds 600 bytes; the 500-byte tail is the largest gap
        let gap = find_gap(&catalog, 600).unwrap();
        assert_eq!(gap.length, 500);
        assert_eq!(gap.offset, START + 500);
        assert_eq!(gap.insert_at, 2);
    }

    #[test]
    fn test_marker_sized_slivers_skipped() {
        // 16-byte gap before the block cannot hold a payload byte
        let catalog = catalog_with_blocks(START + 116, &[(START + 16, 100)]);
        assert_eq!(find_gap(&catalog, 10), None);
    }

    #[test]
    fn test_full_vault_has_no_gap() {
        let catalog = catalog_with_blocks(START + 100, &[(START, 100)]);
        assert_eq!(find_gap(&catalog, 1), None);
    }
}
