use std::hash::Hash;

use crate::composer::Composer;
use crate::{hash_key, Key};

const DISPOSABLE_EFFECT_KEY: Key = 0x6566_6665_6374_0001;

#[derive(Default)]
struct EffectSlot {
    keys: Option<Key>,
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl EffectSlot {
    fn run_cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for EffectSlot {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

/// Handed to a disposable effect so it can register its cleanup.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisposableEffectScope;

impl DisposableEffectScope {
    pub fn on_dispose(&self, cleanup: impl FnOnce() + 'static) -> DisposableEffectResult {
        DisposableEffectResult {
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

/// What a disposable effect leaves behind. The default has no cleanup.
#[derive(Default)]
pub struct DisposableEffectResult {
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl Composer {
    /// Runs `effect` after the pass is applied, and again whenever `keys`
    /// hash differently. The previous run's cleanup fires first; the last
    /// cleanup fires when the effect's group leaves the composition.
    pub fn disposable_effect<K, F>(&self, keys: &K, effect: F)
    where
        K: Hash + ?Sized,
        F: FnOnce(DisposableEffectScope) -> DisposableEffectResult + 'static,
    {
        let keys = hash_key(keys);
        self.with_group(DISPOSABLE_EFFECT_KEY, |composer| {
            let slot = composer.remember(EffectSlot::default);
            if slot.with(|slot| slot.keys == Some(keys)) {
                return;
            }
            slot.update(|slot| {
                slot.run_cleanup();
                slot.keys = Some(keys);
            });
            composer.side_effect(move || {
                let result = effect(DisposableEffectScope);
                slot.update(|slot| slot.cleanup = result.cleanup);
            });
        });
    }
}
