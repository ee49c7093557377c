//! Upstream request construction
//!
//! Maps a structured query target plus the requested time range onto a
//! Finnhub endpoint path and its query parameters. Free-text targets bypass
//! this module entirely and are sent verbatim.

use crate::error::{AdapterError, Result};
use crate::query::{QueryKind, QueryTarget, TimeRange};

/// Endpoint path plus query parameters for one upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
}

/// Build the upstream request for a structured target.
///
/// Trades targets are served by the live trade feed and never reach this
/// builder; forcing one through is a validation error.
pub fn build_request(target: &QueryTarget, range: &TimeRange) -> Result<UpstreamRequest> {
    let symbol = target.normalized_symbol();
    let ref_id = target.ref_id.clone();

    match &target.kind {
        QueryKind::Candle => {
            let resolution = target.resolution.ok_or_else(|| {
                AdapterError::Validation("candle query requires a resolution".to_string())
            })?;
            Ok(UpstreamRequest {
                path: "/stock/candle".to_string(),
                params: vec![
                    ("symbol".to_string(), symbol),
                    ("resolution".to_string(), resolution.as_str().to_string()),
                    ("from".to_string(), range.from.timestamp().to_string()),
                    ("to".to_string(), range.to.timestamp().to_string()),
                    ("refId".to_string(), ref_id),
                ],
            })
        }

        QueryKind::Metric => {
            let metric = target.metric.clone().ok_or_else(|| {
                AdapterError::Validation("metric query requires a metric selector".to_string())
            })?;
            Ok(UpstreamRequest {
                path: "/stock/metric".to_string(),
                params: vec![
                    ("symbol".to_string(), symbol),
                    ("metric".to_string(), metric),
                    ("refId".to_string(), ref_id),
                ],
            })
        }

        QueryKind::SocialSentiment => Ok(UpstreamRequest {
            path: "/stock/social-sentiment".to_string(),
            params: vec![
                ("symbol".to_string(), symbol),
                ("from".to_string(), range.from.format("%Y-%m-%d").to_string()),
                ("to".to_string(), range.to.format("%Y-%m-%d").to_string()),
                ("refId".to_string(), ref_id),
            ],
        }),

        QueryKind::Trades => Err(AdapterError::Validation(
            "trades targets are served by the live trade feed".to_string(),
        )),

        kind => {
            let path = if *kind == QueryKind::Quote {
                "/quote".to_string()
            } else {
                format!("/stock/{}", kind.as_str())
            };
            Ok(UpstreamRequest {
                path,
                params: vec![
                    ("symbol".to_string(), symbol),
                    ("refId".to_string(), ref_id),
                ],
            })
        }
    }
}
