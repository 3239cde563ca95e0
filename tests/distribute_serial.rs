mod common;

use common::{FixedPartitioner, run_ranks};
use grid_scatter::prelude::*;

#[test]
fn one_rank_owns_everything() {
    let topo = GridTopology::cartesian([4, 4, 1]).unwrap();
    let dist = scatter_grid(
        &NoComm,
        Some(&topo),
        None,
        &[],
        &GreedyGrowPartitioner,
        &ScatterOptions::default(),
    )
    .unwrap();

    assert_eq!(dist.num_owned, 16);
    assert_eq!(dist.num_cells(), 16);
    assert!(dist.exports.is_empty());
    assert!(dist.interface.is_empty());
}

#[test]
fn greedy_oracle_balances_two_ranks() {
    let out = run_ranks(2, |comm| {
        let topo = GridTopology::cartesian([4, 4, 1]).unwrap();
        scatter_grid(
            &comm,
            (comm.rank() == 0).then_some(&topo),
            None,
            &[],
            &GreedyGrowPartitioner,
            &ScatterOptions::default(),
        )
        .unwrap()
    });

    assert_eq!(out[0].num_owned + out[1].num_owned, 16);
    assert_eq!(out[0].num_owned, 8);
    // Every cell owned exactly once across the ranks.
    let mut owned: Vec<usize> = out
        .iter()
        .flat_map(|d| (0..d.num_owned).map(|l| d.local_to_global(l)))
        .collect();
    owned.sort_unstable();
    assert_eq!(owned, (0..16).collect::<Vec<_>>());
}

#[test]
fn wider_overlap_copies_more_cells() {
    let dists_for = |layers: usize| {
        run_ranks(2, move |comm| {
            let topo = GridTopology::cartesian([8, 1, 1]).unwrap();
            let oracle = FixedPartitioner(vec![0, 0, 0, 0, 1, 1, 1, 1]);
            let opts = ScatterOptions {
                overlap: OverlapOptions {
                    layers,
                    add_corner_cells: false,
                },
                ..ScatterOptions::default()
            };
            scatter_grid(
                &comm,
                (comm.rank() == 0).then_some(&topo),
                None,
                &[],
                &oracle,
                &opts,
            )
            .unwrap()
        })
    };

    let one = dists_for(1);
    let two = dists_for(2);
    let none = dists_for(0);

    assert_eq!(one[0].num_cells() - one[0].num_owned, 1);
    assert_eq!(two[0].num_cells() - two[0].num_owned, 2);
    assert_eq!(none[0].num_cells(), none[0].num_owned);
    assert!(none[0].interface.is_empty());

    // The layer-2 copies of rank 0 are cells 4 and 5, owned by rank 1.
    let copies: Vec<usize> = two[0].imports[two[0].num_owned..]
        .iter()
        .map(|e| e.global)
        .collect();
    assert_eq!(copies, vec![4, 5]);
}

#[test]
fn dead_faces_keep_the_halo_out() {
    let out = run_ranks(2, |comm| {
        let topo = GridTopology::cartesian([4, 1, 1]).unwrap();
        let oracle = FixedPartitioner(vec![0, 0, 1, 1]);
        // Zero transmissibility on the partition boundary face.
        let trans = vec![1.0, 0.0, 1.0];
        scatter_grid(
            &comm,
            (comm.rank() == 0).then_some(&topo),
            (comm.rank() == 0).then_some(&trans[..]),
            &[],
            &oracle,
            &ScatterOptions::default(),
        )
        .unwrap()
    });

    for dist in &out {
        assert_eq!(dist.num_cells(), dist.num_owned);
        assert!(dist.interface.is_empty());
    }
}
