use super::*;

#[test]
fn rejects_duplicates_and_unknown_parents() {
    let mut applier = RecordingApplier::new();
    applier.insert_node(None, 1).expect("insert root");
    assert_eq!(
        applier.insert_node(None, 1),
        Err(NodeError::Duplicate { id: 1 })
    );
    assert_eq!(
        applier.insert_node(Some(9), 2),
        Err(NodeError::Missing { id: 9 })
    );
    assert_eq!(applier.remove_node(9), Err(NodeError::Missing { id: 9 }));
    assert_eq!(applier.len(), 1);
}

#[test]
fn removing_a_node_drops_its_subtree() {
    let mut applier = RecordingApplier::new();
    applier.insert_node(None, 1).expect("insert");
    applier.insert_node(Some(1), 2).expect("insert");
    applier.insert_node(Some(2), 3).expect("insert");
    applier.insert_node(None, 4).expect("insert");
    assert_eq!(applier.dump_tree(), "#1\n  #2\n    #3\n#4\n");

    applier.remove_node(2).expect("remove");
    assert!(!applier.contains(3));
    assert_eq!(applier.children_of(Some(1)), Vec::<NodeId>::new());
    assert_eq!(applier.children_of(None), vec![1, 4]);
}

#[test]
fn set_children_reparents_and_reorders() {
    let mut applier = RecordingApplier::new();
    for node in 1..=3 {
        applier.insert_node(None, node).expect("insert");
    }
    applier.set_children(None, &[3, 1]).expect("reorder");
    applier.set_children(Some(3), &[2]).expect("reparent");
    assert_eq!(applier.children_of(None), vec![3, 1]);
    assert_eq!(applier.parent_of(2), Some(3));
    assert_eq!(
        applier.set_children(None, &[7]),
        Err(NodeError::Missing { id: 7 })
    );
    assert_eq!(applier.events().len(), 5);
}
