//! # Resources
//!
//! Shared capability objects embedded in every proxy handle:
//!
//! - [`Lifecycle`]: attach, single-flight preparation, cascading close
//! - [`ListenerRegistry`]: change-listener tokens released on close

pub mod lifecycle;
pub mod listeners;

use std::future::Future;

use futures_util::FutureExt;

pub use lifecycle::{CloseFuture, Finalizer, Lifecycle, PrepareState, ResourceStatus};
pub use listeners::{ListenerRegistry, ListenerToken};

/// Drive a future that must already be complete
///
/// # Panics
///
/// Panics if the future would suspend. The blocking personality only talks
/// to channels that answer inline, so a pending future means a deferred
/// channel or a deferred preparation leaked into a blocking call.
pub(crate) fn resolve_now<F: Future>(future: F) -> F::Output {
    match future.now_or_never() {
        Some(output) => output,
        None => panic!("blocking call would suspend: operation is not ready on first poll"),
    }
}
