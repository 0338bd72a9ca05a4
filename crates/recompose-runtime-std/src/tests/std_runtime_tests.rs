use super::StdRuntime;
use recompose_core::MutableState;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

#[test]
fn std_runtime_requests_frame_and_recomposes_on_state_change() {
    let runtime = StdRuntime::new();
    let recomposer = runtime.recomposer();
    let state = MutableState::new(0);
    let recompositions = Rc::new(Cell::new(0u32));

    {
        let state = state.clone();
        let recompositions = Rc::clone(&recompositions);
        recomposer
            .compose(move |composer| {
                recompositions.set(recompositions.get() + 1);
                state.read(composer);
            })
            .expect("initial compose");
    }
    assert_eq!(recompositions.get(), 1);
    assert!(!runtime.take_frame_request());

    state.set(1);
    assert!(
        runtime.take_frame_request(),
        "state.set should request a frame"
    );
    assert!(runtime.handle().has_pending());

    assert_eq!(runtime.run_frame(), Ok(1));
    assert_eq!(
        recompositions.get(),
        2,
        "state change should trigger recomposition"
    );
    assert_eq!(runtime.run_frame(), Ok(0));
}

#[test]
fn frame_waker_fires_for_writes_from_other_threads() {
    let runtime = StdRuntime::new();
    let (tx, rx) = mpsc::channel();
    runtime.set_frame_waker(move || {
        let _ = tx.send(());
    });

    let state = MutableState::new(String::new());
    let reader = state.clone();
    runtime
        .recomposer()
        .compose(move |composer| {
            reader.read(composer);
        })
        .expect("initial compose");

    let writer = state.clone();
    thread::spawn(move || {
        writer.set(String::from("from worker"));
    })
    .join()
    .expect("writer thread");

    rx.try_recv().expect("waker called");
    assert_eq!(runtime.run_frame(), Ok(1));
}

#[test]
fn cleared_waker_is_not_called() {
    let runtime = StdRuntime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    runtime.set_frame_waker(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    runtime.handle().waker().wake_by_ref();
    runtime.clear_frame_waker();
    runtime.handle().waker().wake_by_ref();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(runtime.take_frame_request());
    assert!(!runtime.take_frame_request());
}
