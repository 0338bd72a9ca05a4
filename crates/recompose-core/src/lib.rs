#![doc = r"Core runtime for positional, incrementally re-executed UI compositions."]

pub mod applier;
mod composer;
mod effects;
mod error;
pub mod hash;
mod invalidation;
pub mod platform;
mod recomposer;
mod remember;
mod scope;
mod slot_table;
mod slot_value;
mod state;

pub use applier::{Applier, ApplierHost, ConcreteApplierHost, NodeError};
pub use composer::{Composer, ComposerId};
pub use effects::{DisposableEffectResult, DisposableEffectScope};
pub use error::ComposeError;
pub use hash::hash_key;
pub use platform::{DefaultScheduler, RecomposeScheduler};
pub use recomposer::{Recomposer, RecomposerHandle, RecomposerState, MAX_PASS_EXECUTIONS};
pub use remember::{Owned, RememberedHandle};
pub use scope::RecomposeScope;
pub use slot_value::{HostValue, SlotValue};
pub use state::{MutableState, State};

pub type Key = u64;
pub type NodeId = usize;
pub type ScopeId = usize;
pub type StateId = usize;

/// Derives a group key from a source location.
///
/// Two call sites never share a key unless they share file, line and column,
/// which is what keeps sibling groups from different call sites apart.
pub fn location_key(file: &str, line: u32, column: u32) -> Key {
    hash_key(&(file, line, column))
}

/// Expands to the [`Key`] of the call site it is written at.
#[macro_export]
macro_rules! call_site_key {
    () => {
        $crate::location_key(file!(), line!(), column!())
    };
}

#[cfg(test)]
#[path = "tests/slot_table_tests.rs"]
mod slot_table_tests;

#[cfg(test)]
#[path = "tests/slot_value_tests.rs"]
mod slot_value_tests;

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod composer_tests;

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod state_tests;

#[cfg(test)]
#[path = "tests/recomposer_tests.rs"]
mod recomposer_tests;
