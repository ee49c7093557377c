//! Live trade feed connector
//!
//! One task per streaming target: connect, subscribe, translate inbound trade
//! messages into frame snapshots, and guarantee the unsubscribe/close cleanup
//! on every exit path. Transport errors are logged and do not end the stream;
//! only a close event (either side) or downstream cancellation does.

use crate::frame::{CircularSeries, Frame, QueryEvent, Visualization};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Bounded sample capacity per streaming target
pub const STREAM_CAPACITY: usize = 1000;

/// Inbound feed message envelope
#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Vec<TradePoint>,
}

/// One trade data point: timestamp (epoch ms) and price
#[derive(Debug, Deserialize)]
struct TradePoint {
    t: i64,
    p: f64,
}

/// Commands accepted by a running connector task
#[derive(Debug)]
pub enum StreamCommand {
    Shutdown,
}

/// Handle to a spawned connector task
pub struct StreamHandle {
    ref_id: String,
    commands: mpsc::Sender<StreamCommand>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// Request the cleanup path (unsubscribe, then close) and wait for the
    /// task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(StreamCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawn a connector for one streaming target.
///
/// A connect failure substitutes the placeholder empty frame for the target;
/// no socket is leaked.
pub fn spawn_trade_stream(
    url: Url,
    symbol: String,
    ref_id: String,
    events: mpsc::Sender<QueryEvent>,
) -> StreamHandle {
    let (commands, command_rx) = mpsc::channel(4);
    let handle_ref_id = ref_id.clone();

    let task = tokio::spawn(async move {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!(symbol = %symbol, ref_id = %ref_id, "trade feed connected");
                run_feed(socket, symbol, ref_id, events, command_rx).await;
            }
            Err(e) => {
                error!(symbol = %symbol, ref_id = %ref_id, error = %e, "failed to connect to the trade feed");
                let frame = Frame::empty(&ref_id, Visualization::Graph);
                let _ = events
                    .send(QueryEvent {
                        data: vec![frame],
                        key: Some(ref_id),
                    })
                    .await;
            }
        }
    });

    StreamHandle {
        ref_id: handle_ref_id,
        commands,
        task,
    }
}

/// Drive one subscription over an established transport.
///
/// Generic over the transport so the lifecycle can be exercised against an
/// in-memory socket.
pub(crate) async fn run_feed<S>(
    mut socket: S,
    symbol: String,
    ref_id: String,
    events: mpsc::Sender<QueryEvent>,
    mut commands: mpsc::Receiver<StreamCommand>,
) where
    S: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin,
{
    if let Err(e) = socket
        .send(Message::Text(control_message("subscribe", &symbol)))
        .await
    {
        error!(symbol = %symbol, error = %e, "failed to subscribe to the trade feed");
    }

    let mut series = CircularSeries::new(STREAM_CAPACITY);

    loop {
        tokio::select! {
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Text(raw))) => {
                    if !handle_message(&raw, &mut series, &ref_id, &events).await {
                        debug!(symbol = %symbol, "downstream consumer gone");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!(symbol = %symbol, "trade feed closed by the server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(symbol = %symbol, error = %e, "trade feed transport error");
                }
                None => {
                    info!(symbol = %symbol, "trade feed ended");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(StreamCommand::Shutdown) | None => {
                    debug!(symbol = %symbol, "trade feed unsubscribed downstream");
                    break;
                }
            },
        }
    }

    // Mandatory cleanup on every exit path: unsubscribe, then close.
    let _ = socket
        .send(Message::Text(control_message("unsubscribe", &symbol)))
        .await;
    let _ = socket.close().await;
}

/// Translate one inbound text message; returns false once the downstream
/// consumer is gone.
async fn handle_message(
    raw: &str,
    series: &mut CircularSeries,
    ref_id: &str,
    events: &mpsc::Sender<QueryEvent>,
) -> bool {
    let message: FeedMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "ignoring malformed trade feed message");
            return true;
        }
    };
    if message.kind != "trade" {
        debug!(kind = %message.kind, "ignoring non-trade feed message");
        return true;
    }
    let Some(trade) = message.data.first() else {
        warn!("trade message carried no data points");
        return true;
    };

    series.push(trade.t, trade.p);
    events
        .send(QueryEvent {
            data: vec![series.snapshot(ref_id)],
            key: Some(ref_id.to_string()),
        })
        .await
        .is_ok()
}

fn control_message(kind: &str, symbol: &str) -> String {
    serde_json::json!({ "type": kind, "symbol": symbol }).to_string()
}
