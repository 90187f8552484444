//! Async loop feeding host events, retries, panel ticks and snapshot changes
//! into a [`BindingEngine`].

use crate::binding::engine::{BindingEngine, HostEvent, PanelAction};
use crate::binding::tree::HostTree;
use crate::countdown::{IntervalSpawner, PanelTick};
use crate::snapshot::SnapshotFeed;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Anything the host or the user sends to a bound panel.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingInput {
    Host(HostEvent),
    Panel(PanelAction),
}

/// Channels a [`run_binding`] loop consumes.
#[derive(Debug)]
pub struct BindingChannels {
    pub inputs: mpsc::Receiver<BindingInput>,
    pub ticks: mpsc::UnboundedReceiver<PanelTick>,
    pub feed: SnapshotFeed,
}

/// Drive `engine` until `cancel` fires, the input channel closes or the
/// snapshot publisher goes away. The panel is always unbound on exit, and
/// the engine is handed back.
pub async fn run_binding<T, S, C>(
    mut engine: BindingEngine<T, S>,
    channels: BindingChannels,
    cancel: CancellationToken,
    clock: C,
) -> BindingEngine<T, S>
where
    T: HostTree,
    S: IntervalSpawner,
    C: Fn() -> f64,
{
    let BindingChannels {
        mut inputs,
        mut ticks,
        mut feed,
    } = channels;
    engine.on_snapshot(feed.latest(), clock());

    let mut next_retry: Option<Instant> = None;
    loop {
        if !engine.retry_pending() {
            next_retry = None;
        } else if next_retry.is_none() {
            next_retry = Some(Instant::now() + engine.retry_interval());
        }
        let retry_at = next_retry.unwrap_or_else(Instant::now);

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("binding loop cancelled");
                break;
            }
            input = inputs.recv() => match input {
                Some(BindingInput::Host(event)) => {
                    engine.handle(event, clock());
                }
                Some(BindingInput::Panel(action)) => {
                    if let Err(e) = engine.perform(action, clock()).await {
                        debug!(error = %e, "panel action failed");
                    }
                }
                None => {
                    debug!("binding input channel closed");
                    break;
                }
            },
            Some(tick) = ticks.recv() => {
                engine.on_panel_tick(&tick.subject, clock());
            }
            alive = feed.changed() => {
                if !alive {
                    debug!("snapshot publisher closed; binding loop stopping");
                    break;
                }
                engine.on_snapshot(feed.latest(), clock());
            }
            () = tokio::time::sleep_until(retry_at), if next_retry.is_some() => {
                next_retry = None;
                engine.retry_tick(clock());
            }
        }
    }

    engine.unbind();
    engine
}
