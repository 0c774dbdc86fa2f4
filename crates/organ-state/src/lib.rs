//! # organ-state
//!
//! The normalized in-memory state store.
//!
//! [`GlobalState`] is mutated only through [`reduce`], which applies an
//! [`Action`] and reports an [`Outcome`].  [`Store`] wraps the state, runs the
//! reducer, and mirrors every applied change to local storage through a
//! fire-and-forget [`Persister`].  [`hydrate`] rebuilds a snapshot from storage
//! at start-up.

pub mod action;
pub mod hydrate;
pub mod persist;
pub mod reducer;
pub mod state;
pub mod store;

pub use action::{Action, Changes, Outcome, Skip};
pub use hydrate::hydrate;
pub use persist::{spawn_persister, PersistCommand, Persister};
pub use reducer::reduce;
pub use state::GlobalState;
pub use store::Store;
