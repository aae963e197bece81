//! Piece classifier
//!
//! Classifies each piece of a segment against the reliability snapshot
//! into the categorized index sets the health calculator and Partial
//! processor consume. Pure, synchronous, and allocation-light: callers
//! own the scratch buffers and reuse them across segments.

use std::collections::HashSet;

use crate::reliability::NodeSnapshotEntry;
use crate::redundancy::RedundancyScheme;

/// One erasure-coded piece of a segment, as recorded in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub piece_num: u16,
    pub node_id: [u8; 32],
}

/// Classification of a segment's pieces against the current
/// reliability snapshot.
///
/// Piece numbers are partitioned across these sets; a piece can appear
/// in more than one set (e.g. `exiting` and `out_of_placement`).
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Piece numbers whose node is reliable and placement-compliant.
    pub healthy: Vec<u16>,
    /// Piece numbers whose node is absent from the snapshot entirely.
    pub missing: Vec<u16>,
    /// Piece numbers sharing a last-net with another healthy piece;
    /// only the lowest piece number in each clump stays healthy, the
    /// rest are counted here (declumping).
    pub clumped: Vec<u16>,
    /// Piece numbers whose node is mid-graceful-exit.
    pub exiting: Vec<u16>,
    /// Piece numbers whose node no longer satisfies the segment's
    /// placement constraint.
    pub out_of_placement: Vec<u16>,
    /// Piece numbers whose node is disqualified or excluded, forcing
    /// repair regardless of overall health.
    pub forcing_repair: Vec<u16>,
    /// Piece numbers currently retrievable (healthy + clumped, i.e.
    /// reachable even if clumping makes them non-diverse).
    pub retrievable: Vec<u16>,
}

impl Classification {
    pub fn healthy_count(&self) -> usize {
        self.healthy.len()
    }

    pub fn retrievable_count(&self) -> usize {
        self.retrievable.len()
    }

    pub fn forcing_count(&self) -> usize {
        self.forcing_repair.len()
    }

    pub fn has_clumping(&self) -> bool {
        !self.clumped.is_empty()
    }
}

/// Classifies a segment's pieces against the node snapshot.
///
/// `entries` must be the same length and order as `pieces` (typically
/// produced by `ReliabilityCache::get_nodes`). `do_declumping` and
/// `do_placement_check` gate the corresponding sub-checks: disabled,
/// `Clumped`/`OutOfPlacement` stay empty for every piece.
pub fn classify(
    pieces: &[Piece],
    entries: &[Option<NodeSnapshotEntry>],
    scheme: &RedundancyScheme,
    placement: u16,
    excluded_countries: &[[u8; 2]],
    do_declumping: bool,
    do_placement_check: bool,
    classification: &mut Classification,
) {
    let _ = scheme;
    classification.healthy.clear();
    classification.missing.clear();
    classification.clumped.clear();
    classification.exiting.clear();
    classification.out_of_placement.clear();
    classification.forcing_repair.clear();
    classification.retrievable.clear();

    debug_assert_eq!(pieces.len(), entries.len());

    let mut seen_nets: HashSet<u64> = HashSet::new();

    for (piece, entry) in pieces.iter().zip(entries.iter()) {
        let entry = match entry {
            Some(e) => e,
            None => {
                classification.missing.push(piece.piece_num);
                continue;
            }
        };

        if entry.disqualified || excluded_countries.contains(&entry.country_code) {
            // Excluded-country/disqualified nodes are Missing (not
            // Retrievable) and also force an enqueue regardless of
            // otherwise-healthy count.
            classification.missing.push(piece.piece_num);
            classification.forcing_repair.push(piece.piece_num);
            continue;
        }

        if entry.gracefully_exited {
            classification.missing.push(piece.piece_num);
            continue;
        }

        if entry.exiting {
            // Retrievable now, but never counted as long-term healthy.
            classification.exiting.push(piece.piece_num);
            classification.retrievable.push(piece.piece_num);
            continue;
        }

        if do_placement_check
            && placement != 0
            && entry.placement != 0
            && entry.placement != placement
        {
            classification.out_of_placement.push(piece.piece_num);
            classification.forcing_repair.push(piece.piece_num);
            continue;
        }

        if !entry.online {
            classification.missing.push(piece.piece_num);
            continue;
        }

        classification.retrievable.push(piece.piece_num);

        if !do_declumping {
            classification.healthy.push(piece.piece_num);
            continue;
        }

        if seen_nets.insert(entry.last_net) {
            classification.healthy.push(piece.piece_num);
        } else {
            classification.clumped.push(piece.piece_num);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online_entry(last_net: u64) -> NodeSnapshotEntry {
        NodeSnapshotEntry {
            online: true,
            exiting: false,
            disqualified: false,
            gracefully_exited: false,
            country_code: *b"US",
            last_net,
            placement: 0,
        }
    }

    fn piece(n: u16) -> Piece {
        Piece {
            piece_num: n,
            node_id: [n as u8; 32],
        }
    }

    fn scheme() -> RedundancyScheme {
        RedundancyScheme::new(2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_healthy_pieces_distinct_nets() {
        let pieces = vec![piece(0), piece(1), piece(2)];
        let entries = vec![
            Some(online_entry(1)),
            Some(online_entry(2)),
            Some(online_entry(3)),
        ];
        let mut c = Classification::default();
        classify(&pieces, &entries, &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.healthy, vec![0, 1, 2]);
        assert!(c.clumped.is_empty());
        assert_eq!(c.retrievable_count(), 3);
    }

    #[test]
    fn test_missing_piece_absent_from_snapshot() {
        let pieces = vec![piece(0), piece(1)];
        let entries = vec![Some(online_entry(1)), None];
        let mut c = Classification::default();
        classify(&pieces, &entries, &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.healthy, vec![0]);
        assert_eq!(c.missing, vec![1]);
    }

    #[test]
    fn test_clumped_pieces_share_net() {
        let pieces = vec![piece(0), piece(1), piece(2)];
        let entries = vec![
            Some(online_entry(1)),
            Some(online_entry(1)),
            Some(online_entry(2)),
        ];
        let mut c = Classification::default();
        classify(&pieces, &entries, &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.healthy, vec![0, 2]);
        assert_eq!(c.clumped, vec![1]);
        assert!(c.has_clumping());
        // clumped pieces are still reachable
        assert_eq!(c.retrievable_count(), 3);
    }

    #[test]
    fn test_declumping_disabled_keeps_clumped_empty() {
        let pieces = vec![piece(0), piece(1), piece(2)];
        let entries = vec![
            Some(online_entry(1)),
            Some(online_entry(1)),
            Some(online_entry(2)),
        ];
        let mut c = Classification::default();
        classify(&pieces, &entries, &scheme(), 0, &[], false, true, &mut c);
        assert!(c.clumped.is_empty());
        assert_eq!(c.healthy, vec![0, 1, 2]);
        assert_eq!(c.retrievable_count(), 3);
    }

    #[test]
    fn test_disqualified_forces_repair_and_missing() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.disqualified = true;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.forcing_repair, vec![0]);
        assert_eq!(c.missing, vec![0]);
        assert!(c.healthy.is_empty());
        assert!(c.retrievable.is_empty());
    }

    #[test]
    fn test_excluded_country_forces_repair_and_missing() {
        let pieces = vec![piece(0)];
        let entry = online_entry(1);
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 0, &[*b"US"], true, true, &mut c);
        assert_eq!(c.forcing_repair, vec![0]);
        assert_eq!(c.missing, vec![0]);
    }

    #[test]
    fn test_gracefully_exited_counts_as_missing() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.gracefully_exited = true;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.missing, vec![0]);
    }

    #[test]
    fn test_exiting_piece_retrievable_but_not_healthy() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.exiting = true;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.exiting, vec![0]);
        assert_eq!(c.retrievable, vec![0]);
        assert!(c.healthy.is_empty());
    }

    #[test]
    fn test_out_of_placement_forces_repair() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.placement = 7;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 3, &[], true, true, &mut c);
        assert_eq!(c.out_of_placement, vec![0]);
        assert_eq!(c.forcing_repair, vec![0]);
        assert!(c.healthy.is_empty());
    }

    #[test]
    fn test_placement_check_disabled_keeps_out_of_placement_empty() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.placement = 7;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 3, &[], true, false, &mut c);
        assert!(c.out_of_placement.is_empty());
        assert!(c.forcing_repair.is_empty());
        assert_eq!(c.healthy, vec![0]);
    }

    #[test]
    fn test_offline_counts_as_missing() {
        let pieces = vec![piece(0)];
        let mut entry = online_entry(1);
        entry.online = false;
        let mut c = Classification::default();
        classify(&pieces, &[Some(entry)], &scheme(), 0, &[], true, true, &mut c);
        assert_eq!(c.missing, vec![0]);
    }
}
