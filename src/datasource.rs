//! Query orchestration and the caller-facing datasource API
//!
//! Splits a batch into streaming and one-shot targets, drives the request
//! builder and normalizer for the one-shot group, spawns a live stream
//! connector per trades target, and merges both into a single event channel.

use crate::client::{ApiClient, DataSourceSettings, FinnhubClient};
use crate::error::Result;
use crate::frame::{Frame, QueryEvent, Visualization};
use crate::normalize::normalize;
use crate::query::{QueryKind, QueryTarget, TargetType, TimeRange};
use crate::request::build_request;
use crate::stream::{spawn_trade_stream, StreamHandle};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One batch of query targets plus the requested time range
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub targets: Vec<QueryTarget>,
    pub range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Error,
}

/// Outcome of a connection test
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResult {
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The merged output of one query batch.
///
/// Dropping the subscription also tears the streams down: each connector
/// notices its command channel or the event channel closing and runs its
/// unsubscribe/close cleanup.
pub struct QuerySubscription {
    events: mpsc::Receiver<QueryEvent>,
    streams: Vec<StreamHandle>,
}

impl QuerySubscription {
    /// Next merged event: the one-shot batch (key `None`, exactly once) or a
    /// streaming snapshot keyed by its target's refId. `None` once the batch
    /// has been delivered and every stream has completed.
    pub async fn recv(&mut self) -> Option<QueryEvent> {
        self.events.recv().await
    }

    /// Number of live streaming targets in this subscription.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Cancel every live stream, awaiting each connector's unsubscribe/close
    /// cleanup. One-shot requests already in flight run to completion.
    pub async fn cancel(self) {
        for stream in self.streams {
            stream.shutdown().await;
        }
    }
}

/// Finnhub-backed datasource
pub struct FinnhubDataSource {
    client: Arc<dyn ApiClient>,
    websocket_url: Url,
}

impl FinnhubDataSource {
    pub fn new(settings: DataSourceSettings) -> Result<Self> {
        let client = FinnhubClient::new(&settings)?;
        let websocket_url = client.websocket_url()?;
        Ok(Self {
            client: Arc::new(client),
            websocket_url,
        })
    }

    /// Build a datasource over a custom collaborator, e.g. a mock in tests.
    pub fn with_client(client: Arc<dyn ApiClient>, websocket_url: Url) -> Self {
        Self {
            client,
            websocket_url,
        }
    }

    /// Execute a query batch.
    ///
    /// Hidden targets are dropped up front. Trades targets each get a live
    /// stream connector; everything else resolves concurrently through the
    /// HTTP collaborator and arrives as a single combined event in input
    /// target order.
    pub fn query(&self, request: QueryRequest) -> QuerySubscription {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let visible: Vec<QueryTarget> = request
            .targets
            .into_iter()
            .filter(|target| !target.hidden)
            .collect();
        let (streaming, one_shot): (Vec<QueryTarget>, Vec<QueryTarget>) = visible
            .into_iter()
            .partition(|target| target.kind == QueryKind::Trades);

        info!(
            streaming = streaming.len(),
            one_shot = one_shot.len(),
            "executing query batch"
        );

        let streams = streaming
            .into_iter()
            .map(|target| {
                spawn_trade_stream(
                    self.websocket_url.clone(),
                    target.normalized_symbol(),
                    target.ref_id.clone(),
                    events.clone(),
                )
            })
            .collect();

        let client = Arc::clone(&self.client);
        let range = request.range;
        tokio::spawn(async move {
            let fetches = one_shot.into_iter().map(|target| {
                let client = Arc::clone(&client);
                let range = range.clone();
                async move { resolve_target(client.as_ref(), &target, &range).await }
            });
            let frames: Vec<Frame> = join_all(fetches).await.into_iter().flatten().collect();
            let _ = events.send(QueryEvent { data: frames, key: None }).await;
        });

        QuerySubscription {
            events: receiver,
            streams,
        }
    }

    /// Issue a fixed profile request for a known symbol; success iff the call
    /// returns without error.
    pub async fn test_connection(&self) -> ConnectionTestResult {
        let params = vec![("symbol".to_string(), "AAPL".to_string())];
        match self.client.get("/stock/profile", &params).await {
            Ok(_) => ConnectionTestResult {
                status: TestStatus::Success,
                message: None,
            },
            Err(e) => ConnectionTestResult {
                status: TestStatus::Error,
                message: Some(e.to_string()),
            },
        }
    }

    /// Direct passthrough for a raw query path.
    pub async fn free_text_query(&self, text: &str) -> Result<Value> {
        self.client.get_raw(text).await
    }
}

/// Resolve one one-shot target to its frames. Failures are isolated: the
/// target degrades to the placeholder empty frame and siblings are unaffected.
async fn resolve_target(client: &dyn ApiClient, target: &QueryTarget, range: &TimeRange) -> Vec<Frame> {
    match fetch_target(client, target, range).await {
        Ok(data) => {
            // A wrapped metric response carries the payload one level down.
            let data = match data.get("metric") {
                Some(inner @ Value::Object(_)) => inner.clone(),
                _ => data,
            };
            normalize(target, &data)
        }
        Err(e) => {
            error!(ref_id = %target.ref_id, kind = %target.kind, error = %e, "target request failed");
            let visualization = match target.output_shape() {
                TargetType::Table => Visualization::Table,
                TargetType::Timeseries => Visualization::Graph,
            };
            vec![Frame::empty(&target.ref_id, visualization)]
        }
    }
}

async fn fetch_target(
    client: &dyn ApiClient,
    target: &QueryTarget,
    range: &TimeRange,
) -> Result<Value> {
    if let Some(text) = target.free_text() {
        return client.get_raw(text).await;
    }
    let request = build_request(target, range)?;
    client.get(&request.path, &request.params).await
}
