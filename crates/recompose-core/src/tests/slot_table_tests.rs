use crate::slot_table::SlotTable;
use crate::slot_value::SlotValue;

fn text(value: &str) -> SlotValue {
    SlotValue::from(value)
}

fn write_group(table: &mut SlotTable, key: u64, values: &[&str]) {
    table.begin_group(key);
    for value in values {
        table.set(text(value));
        table.next_slot();
    }
    let removed = table.end_group();
    assert!(removed.is_empty());
}

#[test]
fn first_pass_inserts_groups_and_values() {
    let mut table = SlotTable::new();
    table.begin_pass();
    assert!(table.inserting());
    write_group(&mut table, 1, &["a", "b"]);
    write_group(&mut table, 2, &["c"]);
    let removed = table.end_pass().expect("balanced pass");
    assert!(removed.is_empty());

    assert_eq!(table.len(), 5);
    assert_eq!(table.group_count(), 2);
    assert_eq!(table.header(0).len, 3);
    assert_eq!(table.header(3).len, 2);
}

#[test]
fn revisiting_with_same_keys_keeps_layout() {
    let mut table = SlotTable::new();
    table.begin_pass();
    write_group(&mut table, 1, &["a", "b"]);
    write_group(&mut table, 2, &["c"]);
    table.end_pass().expect("balanced pass");
    let before = table.debug_dump();

    table.begin_pass();
    assert!(!table.inserting());
    let start = table.begin_group(1);
    assert!(!start.inserted);
    assert_eq!(table.get(), text("a"));
    table.next_slot();
    assert_eq!(table.get(), text("b"));
    table.next_slot();
    assert!(table.end_group().is_empty());
    let start = table.begin_group(2);
    assert!(!start.inserted);
    table.skip_to_group_end();
    assert!(table.end_group().is_empty());
    assert!(table.end_pass().expect("balanced pass").is_empty());

    assert_eq!(table.debug_dump(), before);
}

#[test]
fn changed_does_not_advance() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.begin_group(7);
    assert_eq!(table.changed(SlotValue::Int(3)), (true, None));
    assert_eq!(table.changed(SlotValue::Int(3)), (false, None));
    let (changed, previous) = table.changed(SlotValue::Int(4));
    assert!(changed);
    assert_eq!(previous, Some(SlotValue::Int(3)));
    table.next_slot();
    table.end_group();
    table.end_pass().expect("balanced pass");
    assert_eq!(table.len(), 2);
}

#[test]
fn unreached_content_is_trimmed_at_group_end() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.begin_group(1);
    table.set(text("kept"));
    table.next_slot();
    write_group(&mut table, 2, &["child"]);
    table.end_group();
    table.end_pass().expect("balanced pass");
    assert_eq!(table.len(), 4);

    table.begin_pass();
    table.begin_group(1);
    table.next_slot();
    let removed = table.end_group();
    assert_eq!(removed.slots.len(), 2);
    table.end_pass().expect("balanced pass");
    assert_eq!(table.len(), 2);
    assert_eq!(table.header(0).len, 2);
}

#[test]
fn mismatched_key_moves_matching_sibling_forward() {
    let mut table = SlotTable::new();
    table.begin_pass();
    write_group(&mut table, 10, &["a"]);
    write_group(&mut table, 20, &["b"]);
    table.end_pass().expect("balanced pass");

    table.begin_pass();
    let start = table.begin_group(20);
    assert!(start.moved);
    assert!(!start.inserted);
    assert_eq!(start.index, 0);
    assert_eq!(table.get(), text("b"));
    table.next_slot();
    table.end_group();
    let start = table.begin_group(10);
    assert!(!start.moved);
    assert_eq!(table.get(), text("a"));
    table.next_slot();
    table.end_group();
    assert!(table.end_pass().expect("balanced pass").is_empty());

    assert_eq!(table.header(0).key, 20);
    assert_eq!(table.header(2).key, 10);
}

#[test]
fn unknown_key_inserts_before_existing_siblings() {
    let mut table = SlotTable::new();
    table.begin_pass();
    write_group(&mut table, 10, &["a"]);
    table.end_pass().expect("balanced pass");

    table.begin_pass();
    let start = table.begin_group(30);
    assert!(start.inserted);
    assert!(table.inserting());
    table.set(text("new"));
    table.next_slot();
    table.end_group();
    let start = table.begin_group(10);
    assert!(!start.inserted);
    assert_eq!(start.index, 2);
    table.skip_to_group_end();
    table.end_group();
    assert!(table.end_pass().expect("balanced pass").is_empty());
    assert_eq!(table.group_count(), 2);
}

#[test]
fn recomposing_a_group_updates_ancestor_lengths() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.begin_group(1);
    let inner = table.begin_group(2);
    table.set_group_scope(inner.index, 99);
    table.set(text("x"));
    table.next_slot();
    table.end_group();
    table.end_group();
    table.end_pass().expect("balanced pass");
    assert_eq!(table.header(0).len, 3);

    let index = table.begin_recompose(99).expect("scope is in the table");
    assert_eq!(index, 1);
    table.set(text("y"));
    table.next_slot();
    // Established groups only grow through new child groups.
    let extra = table.begin_group(3);
    assert!(extra.inserted);
    table.set(text("z"));
    table.next_slot();
    table.end_group();
    assert!(table.end_recompose().is_empty());
    assert!(!table.in_pass());

    assert_eq!(table.header(1).len, 4);
    assert_eq!(table.header(0).len, 5);
    assert_eq!(table.len(), 5);
}

#[test]
fn child_nodes_look_through_plain_groups() {
    let mut table = SlotTable::new();
    table.begin_pass();
    let outer = table.begin_group(1);
    table.set_group_node(outer.index, 1);
    let plain = table.begin_group(2);
    assert_eq!(plain.index, 1);
    let first = table.begin_group(3);
    table.set_group_node(first.index, 2);
    table.end_group();
    table.end_group();
    let second = table.begin_group(3);
    table.set_group_node(second.index, 3);
    table.end_group();
    table.end_group();
    table.end_pass().expect("balanced pass");

    assert_eq!(table.child_nodes(Some(0)), vec![2, 3]);
    assert_eq!(table.child_nodes(None), vec![1]);
    assert_eq!(table.enclosing_node(2), Some(0));
    assert_eq!(table.enclosing_node(0), None);
}

#[test]
fn removed_ranges_report_only_outermost_nodes_as_detached() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.begin_group(1);
    let parent = table.begin_group(2);
    table.set_group_node(parent.index, 1);
    let child = table.begin_group(3);
    table.set_group_node(child.index, 2);
    table.end_group();
    table.end_group();
    table.end_group();
    table.end_pass().expect("balanced pass");

    table.begin_pass();
    table.begin_group(1);
    let removed = table.end_group();
    table.end_pass().expect("balanced pass");
    assert_eq!(removed.nodes, vec![1, 2]);
    assert_eq!(removed.detached, vec![1]);
}

#[test]
fn end_pass_reports_open_groups() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.begin_group(1);
    table.begin_group(2);
    assert_eq!(table.end_pass().err(), Some(2));
}

#[test]
#[should_panic(expected = "stale slot access")]
fn reading_past_an_established_group_panics() {
    let mut table = SlotTable::new();
    table.begin_pass();
    write_group(&mut table, 1, &["only"]);
    table.end_pass().expect("balanced pass");

    table.begin_pass();
    table.begin_group(1);
    table.next_slot();
    table.get();
}

#[test]
#[should_panic(expected = "end_group called without a matching start_group")]
fn ending_the_root_as_a_group_panics() {
    let mut table = SlotTable::new();
    table.begin_pass();
    table.end_group();
}

#[test]
#[should_panic(expected = "would overwrite the group header")]
fn set_over_a_group_header_panics() {
    let mut table = SlotTable::new();
    table.begin_pass();
    write_group(&mut table, 1, &[]);
    table.end_pass().expect("balanced pass");

    table.begin_pass();
    table.set(text("clobber"));
}
