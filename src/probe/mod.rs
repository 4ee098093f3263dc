// Latency probe: measures ping and RPC round trips against a live endpoint
// over one persistent duplex connection, line-delimited JSON frames.
// Same sequence-correlation pattern as the collection rounds, but over a
// long-lived connection instead of a broadcast fan-out.

pub mod correlator;

use crate::exporter::ExportError;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use correlator::{ProbeCorrelator, next_probe_delay};
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::{Duration, Instant, sleep};

/// The intermediary identity learned from the JOIN handshake is always
/// this long; anything else in a join notice is some other member.
const HISTORY_KEEPER_ID_LEN: usize = 16;

/// Delay between connecting and the first ping, so the endpoint finishes
/// its own accept-side setup.
const STARTUP_DELAY: Duration = Duration::from_secs(1);

/// The two probe gauges in their own registry, scraped on a separate port.
pub struct ProbeMetrics {
    registry: Registry,
    ping_ms: Gauge,
    rpc_ms: Gauge,
}

impl ProbeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ping_ms = Gauge::with_opts(Opts::new(
            "ws_ping",
            "Time in milliseconds before receiving a response to our PING",
        ))?;
        let rpc_ms = Gauge::with_opts(Opts::new(
            "ws_rpc",
            "Time in milliseconds before receiving a response to our RPC command",
        ))?;
        registry.register(Box::new(ping_ms.clone()))?;
        registry.register(Box::new(rpc_ms.clone()))?;
        Ok(Self {
            registry,
            ping_ms,
            rpc_ms,
        })
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    pub fn render(&self) -> Result<String, ExportError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// GET /wsmetrics — the probe's two gauges in exposition format.
async fn wsmetrics_handler(State(metrics): State<Arc<ProbeMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, operation = "render_probe_metrics", "exposition failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn app(metrics: Arc<ProbeMetrics>) -> Router {
    Router::new()
        .route("/wsmetrics", get(wsmetrics_handler)) // GET /wsmetrics
        .with_state(metrics)
}

/// Incoming frames, classified the way the endpoint's protocol shapes them.
#[derive(Debug, PartialEq)]
enum Frame {
    /// `[0, memberId, "JOIN", ...]` — channel membership notice; the
    /// history keeper announces itself here during the handshake.
    JoinNotice(String),
    /// `[0, historyKeeper, _, _, payload]` — RPC response; the payload is a
    /// JSON string whose leading element is the transaction id.
    RpcReply(u64),
    /// Any other leading sequence number: reply to one of our frames.
    Pong(u64),
    Ignored,
    Malformed,
}

fn classify_frame(text: &str, history_keeper: Option<&str>) -> Frame {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Frame::Malformed;
    };
    let Some(arr) = value.as_array() else {
        return Frame::Malformed;
    };
    let Some(first) = arr.first().and_then(|v| v.as_u64()) else {
        return Frame::Malformed;
    };
    if first != 0 {
        return Frame::Pong(first);
    }
    if arr.get(2).and_then(|v| v.as_str()) == Some("JOIN") {
        return match arr.get(1).and_then(|v| v.as_str()) {
            Some(id) => Frame::JoinNotice(id.to_string()),
            None => Frame::Malformed,
        };
    }
    if let Some(hk) = history_keeper
        && arr.get(1).and_then(|v| v.as_str()) == Some(hk)
    {
        let Some(payload) = arr.get(4).and_then(|v| v.as_str()) else {
            return Frame::Malformed;
        };
        let Ok(inner) = serde_json::from_str::<serde_json::Value>(payload) else {
            return Frame::Malformed;
        };
        return match inner.as_array().and_then(|a| a.first()).and_then(|v| v.as_u64()) {
            Some(txid) => Frame::RpcReply(txid),
            None => Frame::Malformed,
        };
    }
    Frame::Ignored
}

async fn send_frame(writer: &mut OwnedWriteHalf, frame: &serde_json::Value) -> std::io::Result<()> {
    let mut line = frame.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

/// One connection's lifetime: handshake, paced pings and RPCs, frame
/// dispatch. Returns only on connection failure; the caller reconnects.
async fn run_connection(
    endpoint: &str,
    channel: &str,
    ping_interval: Duration,
    metrics: &ProbeMetrics,
    correlator: &mut ProbeCorrelator,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect(endpoint).await?;
    tracing::info!(endpoint, "probe connected");
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    correlator.reset();
    let mut history_keeper: Option<String> = None;
    let mut started = false;
    let mut left_channel = false;

    let mut ping_timer = Box::pin(sleep(STARTUP_DELAY));
    let mut ping_armed = true;
    let mut rpc_timer = Box::pin(sleep(Duration::ZERO));
    let mut rpc_armed = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    anyhow::bail!("connection closed by peer");
                };
                match classify_frame(&line, history_keeper.as_deref()) {
                    Frame::JoinNotice(id) => {
                        // RPC probing can only start once the intermediary is known.
                        if history_keeper.is_none() && id.len() == HISTORY_KEEPER_ID_LEN {
                            tracing::debug!(id = %id, "history keeper learned");
                            history_keeper = Some(id);
                            rpc_timer.as_mut().reset(Instant::now());
                            rpc_armed = true;
                        }
                    }
                    Frame::Pong(seq) => {
                        match correlator.settle_ping(seq, Instant::now()) {
                            Some(latency) => {
                                metrics.ping_ms.set(latency.as_millis() as f64);
                                tracing::debug!(latency_ms = latency.as_millis() as u64, "ping round trip");
                                ping_timer.as_mut().reset(
                                    Instant::now() + next_probe_delay(ping_interval, latency),
                                );
                                ping_armed = true;
                            }
                            None => tracing::debug!(seq, "unmatched reply dropped"),
                        }
                    }
                    Frame::RpcReply(txid) => {
                        match correlator.settle_rpc(txid, Instant::now()) {
                            Some(latency) => {
                                metrics.rpc_ms.set(latency.as_millis() as f64);
                                tracing::debug!(latency_ms = latency.as_millis() as u64, "rpc round trip");
                                rpc_timer.as_mut().reset(
                                    Instant::now() + next_probe_delay(ping_interval, latency),
                                );
                                rpc_armed = true;
                            }
                            None => tracing::debug!(txid, "unmatched rpc reply dropped"),
                        }
                    }
                    Frame::Ignored => {}
                    Frame::Malformed => {
                        tracing::debug!(frame = %line, "malformed probe frame dropped");
                    }
                }
            }
            _ = ping_timer.as_mut(), if ping_armed => {
                ping_armed = false;
                let seq = correlator.track_ping(Instant::now());
                send_frame(&mut writer, &serde_json::json!([seq, "PING"])).await?;
                if !started {
                    started = true;
                    let join_seq = correlator.next_seq();
                    send_frame(&mut writer, &serde_json::json!([join_seq, "JOIN", channel])).await?;
                }
            }
            _ = rpc_timer.as_mut(), if rpc_armed => {
                rpc_armed = false;
                if let Some(hk) = history_keeper.clone() {
                    let txid = correlator.track_rpc(Instant::now());
                    let inner = serde_json::json!([txid, ["GET_FILE_SIZE", channel]]).to_string();
                    let seq = correlator.next_seq();
                    send_frame(&mut writer, &serde_json::json!([seq, "MSG", hk, inner])).await?;
                    if !left_channel {
                        // The membership was only needed to learn the
                        // history keeper; RPCs are addressed directly.
                        left_channel = true;
                        let leave_seq = correlator.next_seq();
                        send_frame(
                            &mut writer,
                            &serde_json::json!([leave_seq, "LEAVE", channel, "Monitoring"]),
                        )
                        .await?;
                    }
                }
            }
        }
    }
}

/// Spawns the probe loop: connect, probe until the connection drops, reset
/// all pending state, reconnect after a fixed backoff. Never fatal.
pub fn spawn(
    endpoint: String,
    channel: String,
    ping_interval: Duration,
    reconnect_backoff: Duration,
    metrics: Arc<ProbeMetrics>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut correlator = ProbeCorrelator::new();
        loop {
            tokio::select! {
                result = run_connection(&endpoint, &channel, ping_interval, &metrics, &mut correlator) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, endpoint = %endpoint, "probe connection lost");
                    }
                    correlator.reset();
                    tokio::select! {
                        _ = sleep(reconnect_backoff) => {}
                        _ = &mut shutdown_rx => break,
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
        tracing::debug!("probe shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_join_notice() {
        assert_eq!(
            classify_frame(r#"[0, "abcdefgh12345678", "JOIN", "chan"]"#, None),
            Frame::JoinNotice("abcdefgh12345678".into())
        );
    }

    #[test]
    fn classifies_rpc_reply_only_with_known_keeper() {
        let frame = r#"[0, "abcdefgh12345678", "MSG", "me", "[7, [\"ack\"]]"]"#;
        assert_eq!(
            classify_frame(frame, Some("abcdefgh12345678")),
            Frame::RpcReply(7)
        );
        assert_eq!(classify_frame(frame, None), Frame::Ignored);
        assert_eq!(classify_frame(frame, Some("someoneelse12345")), Frame::Ignored);
    }

    #[test]
    fn classifies_pong_by_leading_sequence() {
        assert_eq!(classify_frame(r#"[42, "PING"]"#, None), Frame::Pong(42));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(classify_frame("not json", None), Frame::Malformed);
        assert_eq!(classify_frame(r#"{"command": "PING"}"#, None), Frame::Malformed);
        assert_eq!(classify_frame(r#"["PING", 1]"#, None), Frame::Malformed);
        assert_eq!(
            classify_frame(
                r#"[0, "abcdefgh12345678", "MSG", "me", "not json"]"#,
                Some("abcdefgh12345678")
            ),
            Frame::Malformed
        );
    }
}
