//! # confgate
//!
//! `confgate` is a small HTTP gateway that accepts configuration updates and
//! forwards them as messages to a message-broker queue. It can also drain a
//! queue and log what arrives, which is handy for watching the updates flow.
//!
//! ## Core Modules
//!
//! - `broker`: broker connections with fixed-interval retry, deadline-bound
//!   publishing, queue subscriptions as streams, and the shared long-lived
//!   channel used by the gateway.
//! - `gateway`: the HTTP endpoints (`/healthz`, `/api/v1/config`).
//! - `config`: loading settings from file, environment and `RABBIT_URL`.
//! - `utils`: shared error types, logging setup and helpers.

pub mod broker;
pub mod config;
pub mod gateway;
pub mod utils;
