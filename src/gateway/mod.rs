//! The `gateway` module is the HTTP face of `confgate`.
//!
//! It accepts configuration updates as JSON and forwards them to the broker
//! through a shared [`SharedChannel`](crate::broker::SharedChannel). Broker
//! failures become request-level errors (502/503/504); the process keeps
//! serving unrelated endpoints.

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;

pub use app::{AppState, build_router, serve};
pub use model::Configuration;

#[cfg(test)]
mod tests;
