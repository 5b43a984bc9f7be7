use crate::error::{LifeError, Result};

/// Contiguous row-block assignment of an N-row grid over P workers.
///
/// Every worker gets `N / P` rows, and the first `N % P` ranks get one extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl Partition {
    pub fn new(grid_size: usize, workers: usize) -> Result<Self> {
        let counts = partition(grid_size, workers)?;
        let offsets = counts
            .iter()
            .scan(0, |acc, &rows| {
                let offset = *acc;
                *acc += rows;
                Some(offset)
            })
            .collect();
        Ok(Partition { counts, offsets })
    }

    pub fn workers(&self) -> usize {
        self.counts.len()
    }

    pub fn grid_size(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Rows owned by `rank`.
    pub fn rows(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// Zero-based index of the first interior row owned by `rank`.
    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    pub fn row_counts(&self) -> &[usize] {
        &self.counts
    }
}

/// Row count per rank, in rank order.
pub fn partition(grid_size: usize, workers: usize) -> Result<Vec<usize>> {
    if workers == 0 || workers > grid_size {
        return Err(LifeError::InvalidTopology { workers, grid_size });
    }
    let base = grid_size / workers;
    let extra = grid_size % workers;
    Ok((0..workers)
        .map(|rank| base + usize::from(rank < extra))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_sum_and_balance() {
        for n in 1..=40 {
            for p in 1..=n {
                let counts = partition(n, p).unwrap();
                assert_eq!(counts.len(), p);
                assert_eq!(counts.iter().sum::<usize>(), n);
                let base = n / p;
                for (rank, &rows) in counts.iter().enumerate() {
                    let expected = if rank < n % p { base + 1 } else { base };
                    assert_eq!(rows, expected, "n={} p={} rank={}", n, p, rank);
                    assert!(rows >= 1);
                }
            }
        }
    }

    #[test]
    fn offsets_are_prefix_sums() {
        let part = Partition::new(10, 4).unwrap();
        assert_eq!(part.row_counts(), &[3, 3, 2, 2]);
        assert_eq!(
            (0..4).map(|r| part.offset(r)).collect::<Vec<_>>(),
            vec![0, 3, 6, 8]
        );
        assert_eq!(part.grid_size(), 10);
    }

    #[test]
    fn deterministic() {
        assert_eq!(partition(97, 13).unwrap(), partition(97, 13).unwrap());
        assert_eq!(Partition::new(97, 13).unwrap(), Partition::new(97, 13).unwrap());
    }

    #[test]
    fn more_workers_than_rows_is_rejected() {
        match partition(3, 4) {
            Err(LifeError::InvalidTopology { workers, grid_size }) => {
                assert_eq!((workers, grid_size), (4, 3));
            }
            other => panic!("expected InvalidTopology, got {:?}", other),
        }
        assert!(partition(3, 0).is_err());
    }
}
