//! In-memory reference stores.
//!
//! Both stores implement the full contracts and are safe for concurrent use.
//! They also count calls and accept injected failures, which is how the
//! strategies' ordering and failure-tolerance rules are exercised in tests.

pub mod durable;
pub mod volatile;

pub use durable::InMemoryDurableStore;
pub use volatile::InMemoryVolatileStore;
