//! Overlink echo bot.
//!
//! A headless peer that accepts everyone, echoes direct messages back,
//! follows conference invites and mirrors what it hears there, and
//! politely declines calls after a short grace period. The behavior
//! lives in [`policy::EchoPolicy`] as a set of engine event handlers;
//! the binary in `main.rs` wires the policy to a
//! [`overlink_engine::engine::SessionEngine`] and drives the iteration
//! loop.
//!
//! # Modules
//!
//! - [`config`] — CLI flags, JSON config file, resolved bot settings
//! - [`policy`] — the echo behavior as event handlers

pub mod config;
pub mod policy;
