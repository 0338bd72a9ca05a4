use super::*;
use crate::applier::ApplierEvent;
use recompose_core::MutableState;
use std::cell::Cell;

fn leaf(composer: &Composer) {
    composer.start_node();
    composer.end_node();
}

#[test]
fn first_pass_inserts_nodes_in_emission_order() {
    run_test_composition(|rule| {
        rule.set_content(|composer| {
            composer.start_node();
            leaf(composer);
            leaf(composer);
            composer.end_node();
            leaf(composer);
        })
        .expect("install content");

        let applier = rule.applier_mut();
        assert_eq!(applier.children_of(None), vec![1, 4]);
        assert_eq!(applier.children_of(Some(1)), vec![2, 3]);
        assert_eq!(
            applier.events()[1],
            ApplierEvent::Insert {
                parent: Some(1),
                node: 2
            }
        );
        assert_eq!(applier.events().len(), 4);
    });
}

#[test]
fn hidden_branch_removes_its_node() {
    run_test_composition(|rule| {
        let show = MutableState::new(true);
        let visible = show.clone();
        rule.set_content(move |composer| {
            composer.start_node();
            if visible.read(composer) {
                composer.with_group(1, leaf);
            }
            composer.end_node();
        })
        .expect("install content");
        assert_eq!(rule.applier_mut().children_of(Some(1)), vec![2]);
        rule.applier_mut().take_events();

        show.set(false);
        assert_eq!(rule.frame_requests(), 1);
        rule.pump_until_idle().expect("recompose");

        assert_eq!(
            rule.applier_mut().take_events(),
            vec![
                ApplierEvent::Remove { node: 2 },
                ApplierEvent::SetChildren {
                    parent: Some(1),
                    children: Vec::new()
                },
            ]
        );
        assert!(!rule.applier_mut().contains(2));
    });
}

#[test]
fn keyed_reorder_moves_nodes_without_recreating_them() {
    run_test_composition(|rule| {
        let items = MutableState::new(vec![10_u64, 20, 30]);
        let reader = items.clone();
        rule.set_content(move |composer| {
            for item in reader.read(composer) {
                composer.with_key(&item, leaf);
            }
        })
        .expect("install content");
        rule.applier_mut().take_events();

        items.set(vec![30, 10, 20]);
        rule.pump_until_idle().expect("recompose");

        assert_eq!(
            rule.applier_mut().take_events(),
            vec![ApplierEvent::SetChildren {
                parent: None,
                children: vec![3, 1, 2]
            }]
        );
        assert_eq!(rule.pending(), 0);
    });
}

#[test]
fn appended_item_is_inserted_then_ordered() {
    run_test_composition(|rule| {
        let items = MutableState::new(vec![1_u64, 2]);
        let reader = items.clone();
        rule.set_content(move |composer| {
            for item in reader.read(composer) {
                composer.with_key(&item, leaf);
            }
        })
        .expect("install content");
        rule.applier_mut().take_events();

        items.set(vec![0, 1, 2]);
        rule.pump_until_idle().expect("recompose");

        let applier = rule.applier_mut();
        assert_eq!(applier.children_of(None), vec![3, 1, 2]);
        assert_eq!(
            applier.events()[0],
            ApplierEvent::Insert {
                parent: None,
                node: 3
            }
        );
    });
}

#[test]
fn recomposing_a_nested_scope_keeps_its_parent_node() {
    run_test_composition(|rule| {
        let count = MutableState::new(1_usize);
        let reader = count.clone();
        let outer_runs = Rc::new(Cell::new(0));
        let runs = Rc::clone(&outer_runs);
        rule.set_content(move |composer| {
            runs.set(runs.get() + 1);
            composer.start_node();
            let reader = reader.clone();
            composer.restart_group(5, move |composer| {
                for index in 0..reader.read(composer) {
                    composer.with_key(&index, leaf);
                }
            });
            composer.end_node();
        })
        .expect("install content");
        rule.applier_mut().take_events();

        count.set(2);
        rule.pump_until_idle().expect("recompose");

        assert_eq!(outer_runs.get(), 1);
        let applier = rule.applier_mut();
        assert_eq!(applier.children_of(Some(1)), vec![2, 3]);
        assert_eq!(applier.parent_of(3), Some(1));
    });
}

#[test]
fn replacing_content_disposes_the_old_tree() {
    run_test_composition(|rule| {
        rule.set_content(|composer| composer.with_group(1, leaf))
            .expect("first content");
        rule.set_content(|composer| composer.with_group(2, leaf))
            .expect("second content");

        let applier = rule.applier_mut();
        assert_eq!(applier.children_of(None), vec![2]);
        assert!(!applier.contains(1));
    });
}
