use std::cell::Cell;
use std::rc::Rc;
use std::thread;

use crate::{Composer, MutableState, Recomposer, RecomposerHandle};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn cells_and_handles_cross_threads() {
    assert_send_sync::<MutableState<i32>>();
    assert_send_sync::<RecomposerHandle>();
}

#[test]
fn set_reports_whether_the_value_changed() {
    let cell = MutableState::new(1);
    assert!(!cell.set(1));
    assert_eq!(cell.version(), 0);
    assert!(cell.set(2));
    assert_eq!(cell.version(), 1);
    assert!(cell.update(|value| *value += 1));
    assert!(!cell.update(|_| {}));
    assert_eq!(cell.value(), 3);
    assert_eq!(cell.version(), 2);
}

#[test]
fn read_only_view_shares_the_cell() {
    let cell = MutableState::new(String::from("a"));
    let view = cell.as_state();
    cell.set(String::from("b"));
    assert_eq!(view.value(), "b");
    assert_eq!(view.id(), cell.id());
    assert_eq!(view.version(), 1);
}

#[test]
fn tracked_read_subscribes_the_reading_scope() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(0);
    let reader = cell.clone();
    let scope = recomposer
        .compose(move |composer| {
            reader.read(composer);
            composer.current_scope().map(|scope| scope.id())
        })
        .expect("compose")
        .expect("root scope");

    assert_eq!(cell.subscriber_count(), 1);
    assert!(cell.set(1));
    let pending = recomposer.get_pending_recompositions();
    assert_eq!(pending.len(), 1);
    assert!(pending.contains(&scope));
}

#[test]
fn untracked_read_subscribes_nothing() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(0);
    let reader = cell.clone();
    recomposer
        .compose(move |_| reader.value())
        .expect("compose");

    cell.set(1);
    assert_eq!(cell.subscriber_count(), 0);
    assert!(!recomposer.has_pending_recompositions());
}

#[test]
fn writes_before_a_pass_coalesce_into_one_entry() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(0);
    let runs = Rc::new(Cell::new(0));
    let (reader, counter) = (cell.clone(), Rc::clone(&runs));
    recomposer
        .compose(move |composer| {
            reader.read(composer);
            counter.set(counter.get() + 1);
        })
        .expect("compose");

    for value in 1..=5 {
        cell.set(value);
    }
    assert_eq!(recomposer.get_pending_recompositions().len(), 1);
    assert_eq!(recomposer.recompose(), Ok(1));
    assert_eq!(runs.get(), 2);
}

#[test]
fn same_value_writes_leave_nothing_pending() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(7);
    let reader = cell.clone();
    recomposer
        .compose(move |composer| reader.read(composer))
        .expect("compose");
    let untouched = recomposer.get_pending_recompositions();

    assert!(!cell.set(7));
    assert_eq!(recomposer.get_pending_recompositions(), untouched);
    assert!(untouched.is_empty());
}

#[test]
fn scopes_stop_listening_to_cells_they_no_longer_read() {
    let recomposer = Recomposer::new();
    let composer = recomposer.create_composer();
    let cell = MutableState::new(0);
    let reads = Rc::new(Cell::new(true));
    let body = {
        let cell = cell.clone();
        let reads = Rc::clone(&reads);
        move |composer: &Composer| {
            if reads.get() {
                cell.read(composer);
            }
        }
    };

    recomposer.compose_with(&composer, body.clone()).expect("first");
    assert_eq!(cell.subscriber_count(), 1);
    reads.set(false);
    recomposer.compose_with(&composer, body).expect("second");
    assert_eq!(cell.subscriber_count(), 0);
    cell.set(1);
    assert!(!recomposer.has_pending_recompositions());
}

#[test]
fn reads_go_to_the_innermost_restart_group() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(0);
    let reader = cell.clone();
    let (outer, inner) = recomposer
        .compose(move |composer| {
            let outer = composer.current_scope().map(|scope| scope.id());
            let inner = Rc::new(Cell::new(None));
            let seen = Rc::clone(&inner);
            let reader = reader.clone();
            composer.restart_group(1, move |composer| {
                composer.with_group(2, |composer| reader.read(composer));
                seen.set(
                    composer
                        .current_scope()
                        .map(|scope| scope.id()),
                );
            });
            (outer, inner.get())
        })
        .expect("compose");

    cell.set(1);
    let pending = recomposer.get_pending_recompositions();
    assert_eq!(pending.len(), 1);
    assert!(pending.contains(&inner.expect("restart scope")));
    assert!(!pending.contains(&outer.expect("root scope")));
}

#[test]
fn writes_from_another_thread_mark_scopes_pending() {
    let recomposer = Recomposer::new();
    let cell = MutableState::new(0_u64);
    let reader = cell.clone();
    recomposer
        .compose(move |composer| reader.read(composer))
        .expect("compose");

    let writer = cell.clone();
    thread::spawn(move || {
        writer.set(42);
    })
    .join()
    .expect("writer thread");

    assert!(recomposer.handle().has_pending());
    assert_eq!(recomposer.recompose(), Ok(1));
    assert!(!recomposer.has_pending_recompositions());
}

#[test]
fn dropped_recomposer_does_not_keep_cells_subscribed() {
    let cell = MutableState::new(0);
    {
        let recomposer = Recomposer::new();
        let reader = cell.clone();
        recomposer
            .compose(move |composer| reader.read(composer))
            .expect("compose");
        assert_eq!(cell.subscriber_count(), 1);
    }
    assert_eq!(cell.subscriber_count(), 0);
    assert!(cell.set(1));
}
