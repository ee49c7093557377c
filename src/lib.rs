//! Finnhub data-source adapter
//!
//! Translates declarative panel queries into Finnhub REST calls and a live
//! WebSocket trade feed, and normalizes the heterogeneous per-kind JSON
//! responses into uniform table/time-series frames for a host visualization
//! platform.
//!
//! The flow: [`FinnhubDataSource::query`] takes a batch of targets plus a
//! time range, drops hidden targets, spawns a [`stream`] connector per trades
//! target, resolves everything else through [`request`] construction and
//! [`normalize`]-ation over the HTTP collaborator, and merges both kinds of
//! results onto one event channel.

pub mod client;
pub mod datasource;
pub mod error;
pub mod frame;
pub mod normalize;
pub mod query;
pub mod request;
pub mod stream;

pub use client::{ApiClient, DataSourceSettings, FinnhubClient, DEFAULT_BASE_URL};
pub use datasource::{
    ConnectionTestResult, FinnhubDataSource, QueryRequest, QuerySubscription, TestStatus,
};
pub use error::{AdapterError, Result};
pub use frame::{CircularSeries, Field, FieldType, Frame, QueryEvent, Visualization};
pub use normalize::normalize;
pub use query::{QueryKind, QueryTarget, Resolution, TargetType, TimeRange};
pub use request::{build_request, UpstreamRequest};
pub use stream::STREAM_CAPACITY;
