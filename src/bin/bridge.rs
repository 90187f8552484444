//! Headless scheduling bridge for stdin/stdout JSON communication.
//!
//! Serves the in-process memory backend over newline-delimited JSON:
//! `CommandEnvelope` messages on stdin, `ResponseEnvelope` and
//! `EventEnvelope` messages on stdout. Due tasks are expired once per
//! engine tick and announced as `timer.task_completed` events.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.
//!
//! Usage: `quick-timer-bridge [CONFIG_PATH]`

use quick_timer::backend::MemoryBackend;
use quick_timer::client::stdio::run_stdio_bridge;
use quick_timer::config::TimerConfig;

fn load_config() -> anyhow::Result<TimerConfig> {
    let explicit = std::env::args_os().nth(1).map(std::path::PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(TimerConfig::default_config_path);
    if explicit.is_none() && !path.exists() {
        return Ok(TimerConfig::default());
    }
    TimerConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = quick_timer::logging::init(&config.logging)?;

    tracing::info!("quick-timer-bridge starting");

    let result = run_stdio_bridge(MemoryBackend::new(), config.engine.tick_interval()).await;

    result.map_err(|e| {
        tracing::error!(error = %e, "quick-timer-bridge exited with error");
        anyhow::anyhow!("quick-timer-bridge failed: {e}")
    })?;

    tracing::info!("quick-timer-bridge shut down cleanly");
    Ok(())
}
