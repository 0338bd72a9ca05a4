use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use recompose_core::{
    call_site_key, Applier, Composer, ConcreteApplierHost, MutableState, NodeError, NodeId,
};
use recompose_runtime_std::StdRuntime;

const DEFAULT_TICKS: u32 = 5;

/// Prints every node mutation instead of building a real tree.
#[derive(Default)]
struct PrintApplier {
    live: usize,
}

impl Applier for PrintApplier {
    fn insert_node(&mut self, parent: Option<NodeId>, node: NodeId) -> Result<(), NodeError> {
        self.live += 1;
        println!("  + node {node} under {parent:?}");
        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), NodeError> {
        self.live = self.live.saturating_sub(1);
        println!("  - node {node}");
        Ok(())
    }

    fn set_children(
        &mut self,
        parent: Option<NodeId>,
        children: &[NodeId],
    ) -> Result<(), NodeError> {
        println!("  ~ children of {parent:?}: {children:?}");
        Ok(())
    }
}

fn label(composer: &Composer, text: String) {
    composer.restart_group(call_site_key!(), move |composer| {
        if !composer.record_input(text.as_str()) && composer.skipping() {
            composer.skip_to_group_end();
            return;
        }
        composer.start_node();
        println!("  label: {text}");
        composer.end_node();
    });
}

fn counter(composer: &Composer, count: &MutableState<u32>) {
    let value = count.read(composer);
    label(composer, String::from("Counter"));
    label(composer, format!("count = {value}"));
    if value % 2 == 0 {
        composer.with_group(call_site_key!(), |composer| {
            label(composer, String::from("even"));
        });
    }
    composer.disposable_effect(&(), |scope| {
        log::info!("counter entered the composition");
        scope.on_dispose(|| log::info!("counter left the composition"))
    });
}

fn ticks() -> anyhow::Result<u32> {
    match std::env::var("RECOMPOSE_DEMO_TICKS") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("RECOMPOSE_DEMO_TICKS must be a number, got {raw:?}")),
        Err(_) => Ok(DEFAULT_TICKS),
    }
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "logging")]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let ticks = ticks()?;
    let runtime = StdRuntime::new();
    let (frames_tx, frames_rx) = mpsc::channel();
    runtime.set_frame_waker(move || {
        let _ = frames_tx.send(());
    });

    let recomposer = runtime.recomposer();
    let applier = Rc::new(ConcreteApplierHost::new(PrintApplier::default()));
    let composer = recomposer.create_composer_with_applier(applier.clone());
    let count = MutableState::new(0_u32);

    println!("=== recompose counter demo ===");
    {
        let count = count.clone();
        recomposer
            .compose_with(&composer, move |composer| counter(composer, &count))
            .context("initial composition")?;
    }

    let writer = count.clone();
    let worker = thread::spawn(move || {
        for _ in 0..ticks {
            thread::sleep(Duration::from_millis(200));
            writer.update(|value| *value += 1);
        }
    });

    let mut frames = 0;
    while count.value() < ticks || runtime.handle().has_pending() {
        frames_rx
            .recv_timeout(Duration::from_secs(2))
            .context("no frame requested")?;
        frames += 1;
        println!("frame {frames}");
        let executions = runtime.run_frame().context("recomposition failed")?;
        log::debug!("frame recomposed {executions} scope(s)");
    }

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("counter thread panicked"))?;
    runtime.clear_frame_waker();
    recomposer
        .dispose_composer(&composer)
        .context("disposing the composition")?;
    println!("live nodes after dispose: {}", applier.borrow_typed().live);
    Ok(())
}
