//! Integration test binary -- all integration tests consolidated into a single
//! binary to keep link time down.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod backend_channel;
mod composition_scheduling;
mod config_roundtrip;
mod countdown_sync;
mod host_binding;
mod preference_sync;
