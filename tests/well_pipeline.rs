mod common;

use common::{FixedPartitioner, run_ranks};
use grid_scatter::prelude::*;

fn perforating(name: &str, is: &[usize]) -> Well {
    Well {
        name: name.into(),
        perforations: is.iter().map(|&i| [i, 0, 0]).collect(),
    }
}

#[test]
fn split_well_is_collected_on_the_majority_rank() {
    let out = run_ranks(2, |comm| {
        let topo = GridTopology::cartesian([4, 1, 1]).unwrap();
        // The oracle splits W across the rank boundary (cell 1 vs 2, 3).
        let oracle = FixedPartitioner(vec![0, 0, 1, 1]);
        let wells = vec![perforating("W", &[1, 2, 3])];
        let root = comm.rank() == 0;
        scatter_grid(
            &comm,
            root.then_some(&topo),
            None,
            if root { wells.as_slice() } else { &[] },
            &oracle,
            &ScatterOptions::default(),
        )
        .unwrap()
    });

    // Rank 1 held 2 of the 3 perforated cells, so cell 1 moved there.
    assert_eq!(out[0].num_owned, 1);
    assert_eq!(out[1].num_owned, 3);
    let owned1: Vec<usize> = (0..3).map(|l| out[1].local_to_global(l)).collect();
    assert_eq!(owned1, vec![1, 2, 3]);

    // The well lives on rank 1, so it is defunct on rank 0 only.
    assert_eq!(out[0].defunct_wells, vec!["W".to_string()]);
    assert!(out[1].defunct_wells.is_empty());
}

#[test]
fn tied_well_goes_to_the_lower_rank() {
    let out = run_ranks(2, |comm| {
        let topo = GridTopology::cartesian([4, 1, 1]).unwrap();
        let oracle = FixedPartitioner(vec![0, 0, 1, 1]);
        let wells = vec![perforating("T", &[1, 2])];
        let root = comm.rank() == 0;
        scatter_grid(
            &comm,
            root.then_some(&topo),
            None,
            if root { wells.as_slice() } else { &[] },
            &oracle,
            &ScatterOptions::default(),
        )
        .unwrap()
    });

    // 1 cell each: the tie resolves to rank 0, pulling cell 2 down.
    assert_eq!(out[0].num_owned, 3);
    assert_eq!(out[1].num_owned, 1);
    assert!(out[0].defunct_wells.is_empty());
    assert_eq!(out[1].defunct_wells, vec!["T".to_string()]);
}

#[test]
fn wells_only_on_root_still_reach_every_rank() {
    // Non-root ranks pass no well data at all; the name table is broadcast.
    let out = run_ranks(3, |comm| {
        let topo = GridTopology::cartesian([6, 1, 1]).unwrap();
        let oracle = FixedPartitioner(vec![0, 0, 1, 1, 2, 2]);
        let wells = vec![perforating("A", &[0, 1]), perforating("B", &[4, 5])];
        let root = comm.rank() == 0;
        scatter_grid(
            &comm,
            root.then_some(&topo),
            None,
            if root { wells.as_slice() } else { &[] },
            &oracle,
            &ScatterOptions::default(),
        )
        .unwrap()
    });

    assert_eq!(out[0].defunct_wells, vec!["B".to_string()]);
    assert_eq!(
        out[1].defunct_wells,
        vec!["A".to_string(), "B".to_string()]
    );
    assert_eq!(out[2].defunct_wells, vec!["A".to_string()]);
}
