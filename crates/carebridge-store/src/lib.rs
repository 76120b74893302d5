//! Resource store contract and resilient access client.
//!
//! The gateway never talks to the remote clinical-data backend directly.
//! Every outbound call goes through [`ResilientClient`], which guards the
//! backend with a circuit breaker, bounds each call with a timeout, and
//! keeps a TTL cache in front of `search`.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod error;
pub mod memory;
pub mod traits;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::{CacheKey, CacheStats, SearchCache};
pub use client::{ClientConfig, ResilientClient};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{ResourceStore, SearchParams};
