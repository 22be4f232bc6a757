//! # chopd-core
//!
//! Core library for chopd, a local development reverse proxy for applications
//! built on the Chopin embedded-wallet framework.
//!
//! The proxy sits between a developer's client and the target application
//! server and makes request/response behavior deterministic and inspectable:
//!
//! - **Serialization**: mutating requests (POST/PUT/PATCH/DELETE) pass through
//!   a single-slot FIFO queue so the target only ever sees one in flight.
//! - **Context correlation**: each queued request gets a callback URL the
//!   target uses to post opaque context entries tied to that request.
//! - **Dev identity**: a `dev-address` cookie or unsigned bearer token is
//!   translated into an `x-address` header on forwarded requests.
//! - **Journaling**: every mutating exchange is recorded together with the
//!   context entries it produced.
//!
//! This crate holds the process-wide state machines and value types; the
//! `chopd` crate wires them into an axum server.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod context;
pub mod identity;
pub mod journal;
pub mod queue;
pub mod token;

pub use address::Address;
pub use config::ChopinConfig;
pub use context::ContextStore;
pub use journal::{Journal, LogEntry};
pub use queue::DispatchQueue;
