// Library exports for the binary, benchmarks and integration tests

// ===== Definitions =====
pub mod config;
pub mod model;
pub mod source;

// ===== Dispatch pipeline =====
pub mod condition;
pub mod delay;
pub mod engine;
pub mod request;
pub mod routing;
pub mod selection;
pub mod template;
pub mod validation;

// ===== Side effects and observability =====
pub mod metrics;
pub mod notify;
pub mod webhook;

// ===== HTTP front end =====
pub mod server;

pub use engine::{DispatchEngine, DispatchError, DispatchResult, InboundRequest};
