//! Shared helpers for integration tests.

use chrono::{DateTime, FixedOffset, TimeZone};
use quick_timer::backend::MemoryBackend;
use quick_timer::backend::memory::Clock;
use quick_timer::client::{BackendCommandClient, SchedulingClient, command_channel};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::task::JoinHandle;

/// 2026-05-01 at `hour:minute` UTC.
pub(crate) fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("utc offset")
        .with_ymd_and_hms(2026, 5, 1, hour, minute, 0)
        .single()
        .expect("valid date")
}

pub(crate) fn epoch(instant: &DateTime<FixedOffset>) -> f64 {
    instant.timestamp() as f64
}

/// A backend whose clock starts at `start` and advances only through the
/// returned offset (seconds).
pub(crate) fn fixed_backend(start: DateTime<FixedOffset>) -> (MemoryBackend, Arc<AtomicI64>) {
    let offset = Arc::new(AtomicI64::new(0));
    let shared = Arc::clone(&offset);
    let clock: Clock =
        Arc::new(move || start + chrono::Duration::seconds(shared.load(Ordering::SeqCst)));
    (MemoryBackend::with_clock(clock), offset)
}

/// Serve `backend` over an in-process command channel.
pub(crate) fn connect(
    backend: MemoryBackend,
) -> (SchedulingClient, BackendCommandClient, JoinHandle<()>) {
    let (client, server) = command_channel(16, 64, backend);
    let server = tokio::spawn(server.run());
    (SchedulingClient::new(Arc::new(client.clone())), client, server)
}
