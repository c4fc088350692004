//! # warden-registry
//!
//! Reference-counted ownership of live per-connection objects.
//!
//! - [`Registry`] - Table of live objects keyed by connection id
//! - [`Handle`] - Borrowed reference that keeps an object alive
//! - [`Owned`] - Capabilities the registry drives: destroy and forced close
//!
//! The table and its reference counts sit behind a single lock. Destruction
//! and close requests always run after that lock is released, so an object's
//! teardown may call back into the registry.
//!
//! Shutdown is two-phase: [`Registry::clear`] only asks every object to close;
//! each one is then removed by its own [`Registry::unregister`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod registry;

pub use registry::{Handle, Owned, Registry};
