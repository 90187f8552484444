//! Quick timer: one-shot entity timers kept in sync across every surface.
//!
//! A timer is composed from targets split into "on start" and "on finish"
//! phases and handed to an external scheduler, which owns the task and
//! publishes a shared snapshot of everything active. Surfaces never own
//! schedule state; they resolve their task in that snapshot and interpolate
//! a countdown between updates.
//!
//! # Architecture
//!
//! - **Composition**: [`composer`] turns targets into start/finish action
//!   lists; [`commands`] is the per-domain command catalog.
//! - **Scheduling client**: [`client`] validates and submits requests over
//!   a versioned command channel or a stdio JSON bridge.
//! - **Countdown**: [`resolver`] maps a surface to its task and
//!   [`countdown`] derives remaining time and progress every tick.
//! - **Preferences**: [`preferences`] caches last-used settings and history
//!   per entity and reconciles them with the snapshot; [`form`] holds the
//!   editable schedule.
//! - **Host binding**: [`binding`] keeps a panel attached inside a detail
//!   view owned by another application.
//! - **Surfaces**: [`surface`] provides the card, tile and overview.

pub mod backend;
pub mod binding;
pub mod client;
pub mod commands;
pub mod composer;
pub mod config;
pub mod countdown;
pub mod error;
pub mod form;
pub mod logging;
pub mod preferences;
pub mod resolver;
pub mod snapshot;
pub mod surface;
pub mod timing;

pub use composer::{ActionList, Target, compose};
pub use config::TimerConfig;
pub use error::{Result, TimerError};
pub use resolver::{SurfaceIdentity, resolve_task};
