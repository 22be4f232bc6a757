//! chopd - the Chopin development proxy daemon.
//!
//! Library surface of the `chopd` binary. Everything the binary wires
//! together lives here so integration tests can run a real proxy in-process:
//! build an [`state::AppState`], obtain the router from [`server::router`],
//! and serve it on an ephemeral listener.

#![warn(clippy::all)]

pub mod control;
pub mod proxy;
pub mod server;
pub mod spawn;
pub mod state;
pub mod ws;
