//! Host surface binding: keeps a quick-timer panel attached inside a
//! detail view owned by another application.

pub mod discovery;
pub mod driver;
pub mod engine;
pub mod panel;
pub mod retry;
pub mod tree;

pub use discovery::{Attachment, Discovery, DiscoveryOutcome, DiscoveryStrategy};
pub use driver::{BindingChannels, BindingInput, run_binding};
pub use engine::{BindOutcome, BindingEngine, BindingState, HostEvent, PanelAction};
pub use panel::{BoundPanel, PANEL_TAG};
pub use retry::{RetryLoop, RetryState, RetryStep};
pub use tree::{HostTree, MemoryTree, NodeId, SharedTree};
