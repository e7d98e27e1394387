//! Identity management for Overlink.
//!
//! This crate owns everything about *who the local peer is*: the Ed25519
//! keypair, the checksummed public address derived from it, the mutable
//! profile and session bookkeeping, and the binary state file that makes
//! all of it survive restarts.
//!
//! # Modules
//!
//! - [`keys`] — Ed25519 keypair generation and seed handling
//! - [`address`] — checksummed public address derivation and parsing
//! - [`identity`] — in-memory identity state (profile, saved peers, id allocators)
//! - [`store`] — binary state file format and the atomic [`store::IdentityStore`]

pub mod address;
pub mod identity;
pub mod keys;
pub mod store;
