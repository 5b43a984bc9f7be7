use std::cell::Cell as StdCell;

use rstest::rstest;

use game_of_life_rows::comm::{Comm, Inbound, LocalComm, LocalGroup, Outbound, Tag};
use game_of_life_rows::evolve::evolve_serial;
use game_of_life_rows::grid::{Cell, FullGrid};
use game_of_life_rows::lifecycle::{run_local_group, run_rank};
use game_of_life_rows::scatter;
use game_of_life_rows::signal::ShutdownFlag;
use game_of_life_rows::{halo, InitialState, LifeError, Parameters, Partition, RowBoundary, RunConfig};

fn pattern_config(generations: usize, grid: FullGrid) -> RunConfig {
    RunConfig::new(Parameters::new(generations, grid.size()).unwrap())
        .with_initial(InitialState::Pattern(grid))
        .with_progress_interval(0)
}

fn run_pattern(workers: usize, generations: usize, grid: FullGrid) -> FullGrid {
    let config = pattern_config(generations, grid);
    run_local_group(workers, &config, &ShutdownFlag::new())
        .unwrap()
        .grid
}

#[rstest]
#[case(1, 1)]
#[case(7, 1)]
#[case(7, 3)]
#[case(7, 7)]
#[case(16, 5)]
#[case(33, 4)]
fn distribute_then_gather_reproduces_the_grid(#[case] n: usize, #[case] workers: usize) {
    let original = FullGrid::random(n, 0xA1 + n as u64, 0.4).unwrap();
    let partition = Partition::new(n, workers).unwrap();

    let results = LocalGroup::run(workers, |comm| {
        if comm.rank() == scatter::ROOT {
            let own = scatter::distribute(&comm, &original, &partition)?;
            let mut gathered = FullGrid::new(n)?;
            scatter::gather(&comm, &mut gathered, &own, &partition)?;
            Ok(Some(gathered))
        } else {
            let local = scatter::receive_block(&comm, &partition)?;
            assert_eq!(local.local_rows(), partition.rows(comm.rank()));
            scatter::send_block(&comm, &local)?;
            Ok(None)
        }
    });

    let mut results = results.into_iter();
    let gathered = results.next().unwrap().unwrap().unwrap();
    assert_eq!(gathered, original);
    for result in results {
        assert!(result.unwrap().is_none());
    }
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn isolated_cell_dies(#[case] workers: usize) {
    let grid = FullGrid::with_live_cells(10, &[(5, 5)]).unwrap();
    let config = pattern_config(1, grid);
    let report = run_local_group(workers, &config, &ShutdownFlag::new()).unwrap();
    assert_eq!(report.population, 0);
    assert_eq!(report.generations, 1);
}

#[test]
fn glider_moves_one_cell_diagonally_every_four_generations() {
    let glider = [(1, 2), (2, 3), (3, 1), (3, 2), (3, 3)];
    let grid = FullGrid::with_live_cells(20, &glider).unwrap();

    let single = run_pattern(1, 4, grid.clone());
    let split = run_pattern(4, 4, grid);
    assert_eq!(single, split);

    let moved: Vec<_> = glider.iter().map(|&(r, c)| (r + 1, c + 1)).collect();
    assert_eq!(split.live_cells(), moved);
}

#[test]
fn glider_crosses_the_row_seam() {
    // Starts in the last rows, so it has to travel through the wrap onto rank 0.
    let glider = [(13, 2), (14, 3), (15, 1), (15, 2), (15, 3)];
    let grid = FullGrid::with_live_cells(16, &glider).unwrap();
    let expected = evolve_serial(&grid, 12, RowBoundary::Toroidal).unwrap();

    for workers in [1, 2, 3, 4] {
        assert_eq!(run_pattern(workers, 12, grid.clone()), expected, "workers={}", workers);
    }
    assert_eq!(expected.population(), 5);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(6)]
fn ghost_rows_mirror_neighbor_boundaries(#[case] workers: usize) {
    let n = 12;
    let full = FullGrid::random(n, 99, 0.5).unwrap();
    let partition = Partition::new(n, workers).unwrap();

    let results = LocalGroup::run(workers, |comm| {
        let rank = comm.rank();
        let mut local = game_of_life_rows::LocalGrid::new(partition.rows(rank), n)?;
        local
            .interior_mut()
            .copy_from_slice(full.matrix().rows_slice(partition.offset(rank) + 1, partition.rows(rank)));

        halo::exchange(&comm, &mut local, RowBoundary::Toroidal)?;

        // Padded row index of the global rows just above and below this block.
        let above = (partition.offset(rank) + n - 1) % n + 1;
        let below = (partition.offset(rank) + partition.rows(rank)) % n + 1;
        assert_eq!(local.top_ghost(), full.matrix().row(above), "rank {} top", rank);
        assert_eq!(local.bottom_ghost(), full.matrix().row(below), "rank {} bottom", rank);
        Ok(())
    });
    for result in results {
        result.unwrap();
    }
}

#[rstest]
#[case(RowBoundary::Toroidal, 1)]
#[case(RowBoundary::Toroidal, 2)]
#[case(RowBoundary::Toroidal, 3)]
#[case(RowBoundary::Toroidal, 8)]
#[case(RowBoundary::Dead, 1)]
#[case(RowBoundary::Dead, 4)]
#[case(RowBoundary::Dead, 9)]
fn matches_single_process_evolution(#[case] boundary: RowBoundary, #[case] workers: usize) {
    for seed in [11u64, 22, 33] {
        let n = 27;
        let initial = FullGrid::random(n, seed, 0.35).unwrap();
        let expected = evolve_serial(&initial, 9, boundary).unwrap();

        let config = RunConfig::new(Parameters::new(9, n).unwrap())
            .with_initial(InitialState::Random { seed, density: 0.35 })
            .with_boundary(boundary);
        let report = run_local_group(workers, &config, &ShutdownFlag::new()).unwrap();
        assert_eq!(report.grid, expected, "seed {} workers {}", seed, workers);
        assert_eq!(report.population, expected.population());
    }
}

#[test]
fn one_row_per_worker() {
    let n = 6;
    let initial = FullGrid::random(n, 5, 0.5).unwrap();
    let expected = evolve_serial(&initial, 5, RowBoundary::Toroidal).unwrap();
    assert_eq!(run_pattern(n, 5, initial), expected);
}

#[test]
fn shutdown_signal_aborts_every_rank() {
    let config = RunConfig::new(Parameters::new(1_000, 16).unwrap());
    let shutdown = ShutdownFlag::new();
    shutdown.trigger();

    let results = LocalGroup::run(3, |comm| run_rank(&comm, &config, &shutdown));
    for result in &results {
        assert!(matches!(
            result,
            Err(LifeError::ExternalSignal) | Err(LifeError::Aborted { .. })
        ));
    }
    assert!(matches!(
        run_local_group(3, &config, &shutdown),
        Err(LifeError::ExternalSignal)
    ));
}

/// Endpoint that fails with `failure` once it has done a number of halo exchanges.
struct FlakyComm {
    inner: LocalComm,
    exchanges_left: StdCell<usize>,
    failure: fn(usize) -> LifeError,
}

fn link_down(peer: usize) -> LifeError {
    LifeError::communication(peer, "link down")
}

/// What the scratch buffer allocation reports when the rank runs out of memory.
fn out_of_memory(_peer: usize) -> LifeError {
    LifeError::Allocation { rows: 5, cols: 20 }
}

impl Comm for FlakyComm {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn send_count(&self, dest: usize, tag: Tag, count: u64) -> game_of_life_rows::Result<()> {
        self.inner.send_count(dest, tag, count)
    }

    fn receive_count(&self, source: usize, tag: Tag) -> game_of_life_rows::Result<u64> {
        self.inner.receive_count(source, tag)
    }

    fn send_rows(&self, dest: usize, tag: Tag, rows: &[Cell]) -> game_of_life_rows::Result<()> {
        self.inner.send_rows(dest, tag, rows)
    }

    fn receive_rows(&self, source: usize, tag: Tag, rows: &mut [Cell]) -> game_of_life_rows::Result<()> {
        self.inner.receive_rows(source, tag, rows)
    }

    fn exchange(
        &self,
        outbound: &[Outbound<'_>],
        inbound: &mut [Inbound<'_>],
    ) -> game_of_life_rows::Result<()> {
        let left = self.exchanges_left.get();
        if left == 0 {
            return Err((self.failure)(outbound[0].dest));
        }
        self.exchanges_left.set(left - 1);
        self.inner.exchange(outbound, inbound)
    }

    fn barrier(&self) -> game_of_life_rows::Result<()> {
        self.inner.barrier()
    }

    fn abort(&self, cause: &LifeError) {
        self.inner.abort(cause)
    }

    fn aborted_by(&self) -> Option<usize> {
        self.inner.aborted_by()
    }
}

#[rstest]
#[case::lost_link(link_down, 3)]
#[case::out_of_memory(out_of_memory, 0)]
fn failure_on_one_rank_aborts_the_group(
    #[case] failure: fn(usize) -> LifeError,
    #[case] exchanges_before_failure: usize,
) {
    let config = RunConfig::new(Parameters::new(50, 20).unwrap()).with_progress_interval(0);
    let shutdown = ShutdownFlag::new();

    let results = LocalGroup::run(4, |comm| {
        let failing = comm.rank() == 2;
        let comm = FlakyComm {
            inner: comm,
            exchanges_left: StdCell::new(if failing {
                exchanges_before_failure
            } else {
                usize::MAX
            }),
            failure,
        };
        run_rank(&comm, &config, &shutdown)
    });

    // The failing rank keeps its own error; only the others see the abort.
    assert_eq!(
        std::mem::discriminant(results[2].as_ref().unwrap_err()),
        std::mem::discriminant(&failure(0))
    );
    for rank in [0, 1, 3] {
        assert!(
            matches!(results[rank], Err(LifeError::Aborted { origin: 2 })),
            "rank {} got {:?}",
            rank,
            results[rank].as_ref().map(|r| r.is_some())
        );
    }
}

#[test]
fn panicking_rank_is_reported_as_the_abort_origin() {
    let config = RunConfig::new(Parameters::new(200, 16).unwrap()).with_progress_interval(0);
    let shutdown = ShutdownFlag::new();

    let results = LocalGroup::run(3, |comm| {
        if comm.rank() == 1 {
            std::thread::sleep(std::time::Duration::from_millis(50));
            panic!("rank 1 lost its grid");
        }
        run_rank(&comm, &config, &shutdown)
    });
    for rank in [0, 2] {
        assert!(
            matches!(results[rank], Err(LifeError::Aborted { origin: 1 })),
            "rank {} got {:?}",
            rank,
            results[rank].as_ref().map(|r| r.is_some())
        );
    }
}
