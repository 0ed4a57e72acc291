use proptest::prelude::*;
use rbeim::collective::{reduce_partitions, Communicator, DofMapping, SerialCommunicator};
use rbeim::proptest::dof_mapping;

#[test]
fn union_merges_cells_of_shared_dofs() {
    let mut a = DofMapping::new();
    a.insert(3, 1);
    a.insert(3, 2);
    let mut b = DofMapping::new();
    b.insert(3, 5);
    b.insert(7, 1);
    let merged = a.union(b);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.cells_of(3).unwrap().iter().copied().collect::<Vec<_>>(), vec![1, 2, 5]);
    assert_eq!(merged.all_cells().into_iter().collect::<Vec<_>>(), vec![1, 2, 5]);
    assert_eq!(merged.dofs().collect::<Vec<_>>(), vec![3, 7]);
}

#[test]
fn serial_communicator_is_its_own_io_process() {
    let communicator = SerialCommunicator;
    assert_eq!(communicator.rank(), 0);
    assert_eq!(communicator.size(), 1);
    assert!(communicator.is_io_process());
    let mut mapping = DofMapping::new();
    mapping.insert(0, 0);
    assert_eq!(communicator.all_reduce_dof_mapping(mapping.clone()), mapping);
}

proptest! {
    #[test]
    fn union_is_commutative(a in dof_mapping(20, 20), b in dof_mapping(20, 20)) {
        prop_assert_eq!(a.clone().union(b.clone()), b.union(a));
    }

    #[test]
    fn union_is_associative(
        a in dof_mapping(20, 20),
        b in dof_mapping(20, 20),
        c in dof_mapping(20, 20),
    ) {
        let left = a.clone().union(b.clone()).union(c.clone());
        let right = a.union(b.union(c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn partition_reduction_agrees_with_sequential_union(
        partitions in proptest::collection::vec(dof_mapping(30, 30), 0..6),
    ) {
        let sequential = partitions.iter().cloned().fold(DofMapping::new(), DofMapping::union);
        prop_assert_eq!(reduce_partitions(partitions), sequential);
    }
}
