//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod fake_engine;
pub mod gated;

use std::sync::Arc;

use relaydb::{BlockingDatabase, DeferredDatabase, DirectChannel, WorkerChannel};

pub use fake_engine::FakeEngine;
pub use gated::GatedChannel;

/// Blocking database over a fresh fake engine.
pub fn blocking_database() -> (Arc<FakeEngine>, Arc<DirectChannel>, BlockingDatabase) {
    let engine = Arc::new(FakeEngine::new());
    let channel = Arc::new(DirectChannel::new(engine.clone()));
    let database = BlockingDatabase::open(channel.clone(), "people").unwrap();
    (engine, channel, database)
}

/// Deferred database hosted on a worker thread.
pub async fn deferred_database() -> (Arc<FakeEngine>, Arc<WorkerChannel>, DeferredDatabase) {
    let engine = Arc::new(FakeEngine::new());
    let channel = Arc::new(WorkerChannel::spawn(engine.clone()).unwrap());
    let database = DeferredDatabase::open(channel.clone(), "people").await.unwrap();
    (engine, channel, database)
}

/// Deferred database over the inline channel.
pub async fn deferred_direct_database() -> (Arc<FakeEngine>, Arc<DirectChannel>, DeferredDatabase) {
    let engine = Arc::new(FakeEngine::new());
    let channel = Arc::new(DirectChannel::new(engine.clone()));
    let database = DeferredDatabase::open(channel.clone(), "people").await.unwrap();
    (engine, channel, database)
}
