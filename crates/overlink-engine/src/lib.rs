//! Overlink session engine.
//!
//! [`engine::SessionEngine`] is the single-threaded heart of an Overlink
//! peer. It owns the local identity, the peer roster, joined conferences
//! and pending calls; each call to
//! [`run_iteration`](engine::SessionEngine::run_iteration) drains due
//! deferred actions, polls the overlay, translates link events into
//! engine events, hands them to the registered handlers, and applies the
//! actions the handlers return. The engine never spawns threads and
//! never blocks; the caller owns the loop and sleeps the delay each
//! iteration recommends.
//!
//! # Modules
//!
//! - [`bootstrap`] — bootstrap node list parsing and connection
//! - [`dispatcher`] — per-event-kind handler registry
//! - [`timer`] — engine clock and the deferred-action queue
//! - [`roster`] — peer, conference, and pending-call tables
//! - [`engine`] — [`engine::SessionEngine`] itself

pub mod bootstrap;
pub mod dispatcher;
pub mod engine;
pub mod roster;
pub mod timer;
