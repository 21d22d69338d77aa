//! Range partitioner properties.

use partition_batch::partition::{partition, partition_key_space, KeySpace};
use proptest::prelude::*;

#[test]
fn ten_keys_over_three_partitions() {
    let set = partition(10, 3).unwrap();
    let bounds: Vec<(i64, i64)> = set.iter().map(|r| (r.start, r.end)).collect();
    assert_eq!(bounds, vec![(1, 4), (5, 8), (9, 10)]);
}

#[test]
fn more_partitions_than_keys_leaves_empty_ranges_out_of_dispatch() {
    let set = partition(2, 5).unwrap();
    assert_eq!(set.len(), 5);
    assert_eq!(set.dispatchable().len(), 2);
    assert_eq!(set.empty_count(), 3);
    assert!(set.dispatchable().iter().all(|r| !r.is_empty()));
}

#[test]
fn zero_extent_plans_nothing() {
    let set = partition(0, 3).unwrap();
    assert!(set.dispatchable().is_empty());
    assert_eq!(set.covered_keys(), 0);
}

#[test]
fn invalid_inputs_are_planning_errors() {
    assert!(partition(10, 0).unwrap_err().is_planning());
    assert!(partition(-1, 3).unwrap_err().is_planning());
}

proptest! {
    #[test]
    fn ranges_are_disjoint_and_cover_the_extent(extent in 1i64..5_000, grid in 1i64..200) {
        let set = partition(extent, grid).unwrap();
        prop_assert_eq!(set.len() as i64, grid);

        let ranges = set.dispatchable();
        prop_assert_eq!(ranges.first().map(|r| r.start), Some(1));
        prop_assert_eq!(ranges.last().map(|r| r.end), Some(extent));
        for pair in ranges.windows(2) {
            prop_assert_eq!(pair[0].end + 1, pair[1].start);
        }
        prop_assert_eq!(set.covered_keys(), extent as u64);
    }

    #[test]
    fn indices_follow_grid_order(extent in 0i64..1_000, grid in 1i64..50) {
        let set = partition(extent, grid).unwrap();
        for (position, range) in set.iter().enumerate() {
            prop_assert_eq!(range.index as usize, position);
        }
    }

    #[test]
    fn arbitrary_key_spaces_are_covered_exactly(min in -1_000_000i64..1_000_000, extent in 1i64..10_000, grid in 1i64..64) {
        let key_space = KeySpace::new(min, min + extent - 1);
        let set = partition_key_space(key_space, grid).unwrap();
        let ranges = set.dispatchable();

        prop_assert_eq!(ranges.first().map(|r| r.start), Some(key_space.min_key));
        prop_assert_eq!(ranges.last().map(|r| r.end), Some(key_space.max_key));
        prop_assert_eq!(set.covered_keys(), extent as u64);
        for key in [key_space.min_key, key_space.max_key, min + extent / 2] {
            prop_assert_eq!(ranges.iter().filter(|r| r.contains(key)).count(), 1);
        }
    }
}
