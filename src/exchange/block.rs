//! Deterministic routing of global ids to ranks.
//!
//! Two descriptors cover the join's needs:
//!
//! - [`BlockDistribution`] partitions a dense 1-based global-id space into
//!   contiguous, equally-sized blocks, one per rank. Reductions (tolerance
//!   sync, dense numbering) route each id to its block owner, which makes the
//!   result independent of replication count and arrival order.
//! - [`RankIndex`] is the monotone range map consumed from the outside world:
//!   rank `r` owns the global ids in `(index[r], index[r + 1]]`. The face
//!   exchanger resolves owners against it by range search; an id outside the
//!   covered range is a fatal consistency error.

use crate::join_error::JoinError;

/// Contiguous block partition of the global-id space `1..=n_global`.
#[derive(Copy, Clone, Debug)]
pub struct BlockDistribution {
    n_ranks: usize,
    block_size: u64,
}

impl BlockDistribution {
    /// Partition `n_global` ids over `n_ranks` blocks of equal size (the last
    /// block may be short).
    pub fn new(n_ranks: usize, n_global: u64) -> Self {
        let n_ranks = n_ranks.max(1);
        let block_size = n_global.div_ceil(n_ranks as u64).max(1);
        BlockDistribution {
            n_ranks,
            block_size,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Owning rank of a 1-based global id.
    pub fn owner(&self, gid: u64) -> usize {
        debug_assert!(gid > 0);
        (((gid - 1) / self.block_size) as usize).min(self.n_ranks - 1)
    }

    /// First 1-based global id of a rank's block.
    pub fn first_gid(&self, rank: usize) -> u64 {
        rank as u64 * self.block_size + 1
    }

    /// Position of `gid` inside its owner's block.
    pub fn local_index(&self, gid: u64) -> usize {
        ((gid - 1) % self.block_size) as usize
    }
}

/// Monotone global-id-range→rank map: rank `r` owns ids in
/// `(index[r], index[r + 1]]`.
#[derive(Clone, Debug)]
pub struct RankIndex {
    index: Vec<u64>,
}

impl RankIndex {
    /// Validate and wrap a raw index of length `n_ranks + 1`.
    pub fn new(index: Vec<u64>) -> Result<Self, JoinError> {
        for position in 1..index.len() {
            if index[position] < index[position - 1] {
                return Err(JoinError::RankIndexNotMonotone { position });
            }
        }
        Ok(RankIndex { index })
    }

    pub fn n_ranks(&self) -> usize {
        self.index.len().saturating_sub(1)
    }

    /// First 1-based global id owned by `rank`.
    pub fn first_gid(&self, rank: usize) -> u64 {
        self.index[rank] + 1
    }

    /// Resolve the owner of a 1-based global id by range search.
    pub fn owner_of(&self, gid: u64) -> Result<usize, JoinError> {
        if gid == 0 || gid > *self.index.last().unwrap_or(&0) {
            return Err(JoinError::UnresolvedGlobalId(gid));
        }
        // First rank whose upper bound reaches gid.
        let rank = self.index[1..].partition_point(|&upper| upper < gid);
        Ok(rank)
    }

    /// Resolve owners for a sorted id list with a single monotone walk.
    pub fn owners_of_sorted(&self, gids: &[u64]) -> Result<Vec<usize>, JoinError> {
        let n_ranks = self.n_ranks();
        let mut owners = Vec::with_capacity(gids.len());
        let mut rank = 0usize;
        for &gid in gids {
            if gid == 0 {
                return Err(JoinError::UnresolvedGlobalId(gid));
            }
            while rank < n_ranks && self.index[rank + 1] < gid {
                rank += 1;
            }
            if rank == n_ranks {
                return Err(JoinError::UnresolvedGlobalId(gid));
            }
            owners.push(rank);
        }
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_owner_and_index() {
        let bd = BlockDistribution::new(3, 10);
        // block_size = ceil(10/3) = 4: ranks own 1..=4, 5..=8, 9..=10.
        assert_eq!(bd.block_size(), 4);
        assert_eq!(bd.owner(1), 0);
        assert_eq!(bd.owner(4), 0);
        assert_eq!(bd.owner(5), 1);
        assert_eq!(bd.owner(10), 2);
        assert_eq!(bd.first_gid(1), 5);
        assert_eq!(bd.local_index(5), 0);
        assert_eq!(bd.local_index(8), 3);
    }

    #[test]
    fn block_empty_space_is_safe() {
        let bd = BlockDistribution::new(4, 0);
        assert_eq!(bd.owner(1), 0);
    }

    #[test]
    fn rank_index_owner_lookup() {
        let idx = RankIndex::new(vec![0, 4, 4, 9]).unwrap();
        assert_eq!(idx.n_ranks(), 3);
        assert_eq!(idx.owner_of(1).unwrap(), 0);
        assert_eq!(idx.owner_of(4).unwrap(), 0);
        // rank 1 owns nothing.
        assert_eq!(idx.owner_of(5).unwrap(), 2);
        assert_eq!(idx.owner_of(9).unwrap(), 2);
        assert!(matches!(
            idx.owner_of(10),
            Err(JoinError::UnresolvedGlobalId(10))
        ));
        assert!(matches!(
            idx.owner_of(0),
            Err(JoinError::UnresolvedGlobalId(0))
        ));
    }

    #[test]
    fn rank_index_sorted_walk_matches_search() {
        let idx = RankIndex::new(vec![0, 3, 7, 7, 12]).unwrap();
        let gids: Vec<u64> = (1..=12).collect();
        let owners = idx.owners_of_sorted(&gids).unwrap();
        for (gid, owner) in gids.iter().zip(&owners) {
            assert_eq!(idx.owner_of(*gid).unwrap(), *owner, "gid {gid}");
        }
    }

    #[test]
    fn rank_index_rejects_decreasing() {
        assert!(matches!(
            RankIndex::new(vec![0, 5, 3]),
            Err(JoinError::RankIndexNotMonotone { position: 2 })
        ));
    }
}
