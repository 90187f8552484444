//! Stdin/stdout JSON bridge for the backend command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the `BackendCommandServer` router, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output must go to stderr.

use crate::client::channel::{BackendCommandClient, SchedulerBackend, command_channel};
use crate::client::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use crate::error::{Result, TimerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

const REQUEST_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 128;

/// Run the bridge on the process stdin/stdout until stdin closes or a
/// `bridge.stop` command is received. Due tasks are expired every
/// `expiry_period` and announced as `timer.task_completed` events.
pub async fn run_stdio_bridge<B: SchedulerBackend>(backend: B, expiry_period: Duration) -> Result<()> {
    serve(
        backend,
        Some(expiry_period),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge over arbitrary line-oriented reader and writer.
pub async fn run_bridge<B, R, W>(backend: B, input: R, output: W) -> Result<()>
where
    B: SchedulerBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve(backend, None, input, output).await
}

/// [`run_bridge`] with periodic expiry of due tasks.
pub async fn run_bridge_with_expiry<B, R, W>(
    backend: B,
    expiry_period: Duration,
    input: R,
    output: W,
) -> Result<()>
where
    B: SchedulerBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve(backend, Some(expiry_period), input, output).await
}

/// Three tasks cooperate: the reader (this task) dispatches each command
/// and writes its response, an event forwarder writes broadcast events,
/// and the server routes commands to `backend`. Dropping the client when
/// the reader finishes lets the server exit on its own.
async fn serve<B, R, W>(backend: B, expiry: Option<Duration>, input: R, output: W) -> Result<()>
where
    B: SchedulerBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, server) = command_channel(REQUEST_CAPACITY, EVENT_CAPACITY, backend);
    let writer = Arc::new(Mutex::new(output));

    let server_handle = tokio::spawn(async move {
        match expiry {
            Some(period) => server.run_with_expiry(period).await,
            None => server.run().await,
        }
    });

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tracing::info!("event channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(client, input, Arc::clone(&writer)).await;

    // The server holds the last event sender; once it exits the forwarder
    // drains what is buffered and sees the channel close.
    let _ = server_handle.await;
    let _ = event_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    client: BackendCommandClient,
    mut reader: R,
    writer: Arc<Mutex<W>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TimerError::Channel(format!("failed to read input: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                let json = serde_json::to_string(&error_response).map_err(|se| {
                    TimerError::Channel(format!("failed to serialize parse-error response: {se}"))
                })?;
                let mut w = writer.lock().await;
                write_line(&mut *w, &json).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::BridgeStop;
        let request_id = envelope.request_id.clone();

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "command dispatch failed");
                ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
            }
        };

        let json = serde_json::to_string(&response)
            .map_err(|e| TimerError::Channel(format!("failed to serialize response envelope: {e}")))?;

        {
            let mut w = writer.lock().await;
            write_line(&mut *w, &json).await?;
        }

        if is_stop {
            tracing::info!("bridge.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| TimerError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| TimerError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| TimerError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
