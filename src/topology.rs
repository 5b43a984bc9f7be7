/// Ranks adjacent to a worker in the row dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbors {
    /// Owner of the rows just above this worker's block. Feeds the top ghost row.
    pub prev: Option<usize>,
    /// Owner of the rows just below this worker's block. Feeds the bottom ghost row.
    pub next: Option<usize>,
}

/// What lies past the first and last row of the board.
///
/// Columns always end in a dead border. Rows either wrap around the worker ring or end in
/// a dead border as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RowBoundary {
    /// Rank 0's top ghost is the last rank's bottom row and vice versa.
    #[default]
    Toroidal,
    /// The first and last ranks keep dead ghost rows at the board edge.
    Dead,
}

impl RowBoundary {
    /// Resolves the row neighbours of `rank` in a group of `size` workers.
    pub fn neighbors(self, rank: usize, size: usize) -> Neighbors {
        debug_assert!(rank < size);
        match self {
            RowBoundary::Toroidal => Neighbors {
                prev: Some((rank + size - 1) % size),
                next: Some((rank + 1) % size),
            },
            RowBoundary::Dead => Neighbors {
                prev: rank.checked_sub(1),
                next: if rank + 1 < size { Some(rank + 1) } else { None },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_at_both_ends() {
        let n = RowBoundary::Toroidal.neighbors(0, 4);
        assert_eq!((n.prev, n.next), (Some(3), Some(1)));
        let n = RowBoundary::Toroidal.neighbors(3, 4);
        assert_eq!((n.prev, n.next), (Some(2), Some(0)));
    }

    #[test]
    fn ring_degenerates_for_small_groups() {
        let n = RowBoundary::Toroidal.neighbors(0, 1);
        assert_eq!((n.prev, n.next), (Some(0), Some(0)));
        let n = RowBoundary::Toroidal.neighbors(1, 2);
        assert_eq!((n.prev, n.next), (Some(0), Some(0)));
    }

    #[test]
    fn dead_boundary_has_open_ends() {
        let n = RowBoundary::Dead.neighbors(0, 3);
        assert_eq!((n.prev, n.next), (None, Some(1)));
        let n = RowBoundary::Dead.neighbors(2, 3);
        assert_eq!((n.prev, n.next), (Some(1), None));
        let n = RowBoundary::Dead.neighbors(0, 1);
        assert_eq!((n.prev, n.next), (None, None));
    }
}
