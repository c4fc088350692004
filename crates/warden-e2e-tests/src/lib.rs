//! End-to-end tests for the warden gateway.
//!
//! These tests exercise the full stack over loopback TCP:
//! - Key exchange and sealed application frames
//! - Heartbeat challenges, replies and misses
//! - Protocol violations closing a single connection
//! - Connection and request admission limits
//! - Two-phase gateway shutdown

#![cfg(test)]
