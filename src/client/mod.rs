//! Scheduling client: typed requests, the wire contract, and the channel
//! that carries them to a backend.

pub mod channel;
pub mod contract;
pub mod scheduling;
pub mod stdio;

pub use channel::{BackendCommandClient, BackendCommandServer, SchedulerBackend, command_channel};
pub use scheduling::{ScheduleRequest, ScheduleTransport, SchedulingClient};
