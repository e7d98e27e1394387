//! Overlay network seam for Overlink.
//!
//! The session engine never talks to a concrete network stack. It drives
//! an implementation of the [`link::Overlay`] trait and consumes the
//! [`link::LinkEvent`]s that implementation surfaces. This crate defines
//! that seam and ships one implementation: the in-process
//! [`memory::OverlayHub`], which connects any number of endpoints through
//! shared memory and is what the echo daemon and the test suites run on.
//!
//! # Modules
//!
//! - [`link`] — [`link::LinkEvent`] and the [`link::Overlay`] trait
//! - [`memory`] — in-memory reference overlay ([`memory::OverlayHub`] / [`memory::MemoryOverlay`])

pub mod link;
pub mod memory;
