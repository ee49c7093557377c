//! Query model and target classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output shape of a query target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Table,
    Timeseries,
}

/// Supported query kinds
///
/// Free-form kinds arriving from the editor are preserved in `Other` and
/// classified as tabular.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueryKind {
    Profile,
    Quote,
    Candle,
    Metric,
    Earnings,
    SocialSentiment,
    Trades,
    Other(String),
}

impl QueryKind {
    pub fn as_str(&self) -> &str {
        match self {
            QueryKind::Profile => "profile",
            QueryKind::Quote => "quote",
            QueryKind::Candle => "candle",
            QueryKind::Metric => "metric",
            QueryKind::Earnings => "earnings",
            QueryKind::SocialSentiment => "social-sentiment",
            QueryKind::Trades => "trades",
            QueryKind::Other(kind) => kind,
        }
    }

    /// Classify the kind into its output shape.
    ///
    /// Total over all inputs: anything outside the fixed time-series set is
    /// tabular, including unrecognized kinds.
    pub fn target_type(&self) -> TargetType {
        match self {
            QueryKind::Quote
            | QueryKind::Earnings
            | QueryKind::Candle
            | QueryKind::Trades
            | QueryKind::SocialSentiment => TargetType::Timeseries,
            _ => TargetType::Table,
        }
    }
}

impl From<String> for QueryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "profile" => QueryKind::Profile,
            "quote" => QueryKind::Quote,
            "candle" => QueryKind::Candle,
            "metric" => QueryKind::Metric,
            "earnings" => QueryKind::Earnings,
            "social-sentiment" => QueryKind::SocialSentiment,
            "trades" => QueryKind::Trades,
            _ => QueryKind::Other(value),
        }
    }
}

impl From<QueryKind> for String {
    fn from(kind: QueryKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a free-text query path by its leading path segment.
///
/// Only the text before the first `?` is considered.
pub fn classify_path(text: &str) -> TargetType {
    let path = text.split('?').next().unwrap_or_default();
    let leading = path.split('/').next().unwrap_or_default();
    QueryKind::from(leading.to_string()).target_type()
}

/// Candle resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1")]
    Min1,
    #[serde(rename = "5")]
    Min5,
    #[serde(rename = "15")]
    Min15,
    #[serde(rename = "30")]
    Min30,
    #[serde(rename = "60")]
    Min60,
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Min1 => "1",
            Resolution::Min5 => "5",
            Resolution::Min15 => "15",
            Resolution::Min30 => "30",
            Resolution::Min60 => "60",
            Resolution::Day => "D",
            Resolution::Week => "W",
            Resolution::Month => "M",
        }
    }
}

/// One requested query within a batch, as produced by the query editor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTarget {
    /// Caller-assigned correlation id, echoed on every resulting frame
    pub ref_id: String,
    pub kind: QueryKind,
    /// Instrument identifier; uppercased before use
    pub symbol: String,
    /// Only meaningful for candle queries
    pub resolution: Option<Resolution>,
    /// Only meaningful for metric queries
    pub metric: Option<String>,
    /// Raw query path; overrides kind-based construction when non-empty
    pub free_text: Option<String>,
    /// Hidden targets are excluded from execution entirely
    pub hidden: bool,
}

impl Default for QueryTarget {
    fn default() -> Self {
        Self {
            ref_id: String::new(),
            kind: QueryKind::Profile,
            symbol: String::new(),
            resolution: None,
            metric: None,
            free_text: None,
            hidden: false,
        }
    }
}

impl QueryTarget {
    /// The free-text query, if present and non-empty.
    pub fn free_text(&self) -> Option<&str> {
        self.free_text.as_deref().filter(|text| !text.is_empty())
    }

    /// Output shape of this target: free text is classified by its path,
    /// structured targets by their kind.
    pub fn output_shape(&self) -> TargetType {
        match self.free_text() {
            Some(text) => classify_path(text),
            None => self.kind.target_type(),
        }
    }

    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_uppercase()
    }
}

/// Requested time range, consumed by candle and social-sentiment queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeseries_kinds() {
        for kind in ["quote", "earnings", "candle", "trades", "social-sentiment"] {
            assert_eq!(
                QueryKind::from(kind.to_string()).target_type(),
                TargetType::Timeseries,
                "{kind} should be a time-series kind"
            );
        }
    }

    #[test]
    fn test_table_kinds() {
        for kind in ["profile", "metric", "profile2", "press-releases", ""] {
            assert_eq!(
                QueryKind::from(kind.to_string()).target_type(),
                TargetType::Table,
                "{kind} should be a table kind"
            );
        }
    }

    #[test]
    fn test_classify_path() {
        assert_eq!(classify_path("quote?symbol=AAPL"), TargetType::Timeseries);
        assert_eq!(classify_path("stock/candle?symbol=AAPL"), TargetType::Table);
        assert_eq!(classify_path("profile"), TargetType::Table);
    }

    #[test]
    fn test_free_text_wins_when_non_empty() {
        let mut target = QueryTarget {
            kind: QueryKind::Metric,
            free_text: Some("quote?symbol=AAPL".to_string()),
            ..QueryTarget::default()
        };
        assert_eq!(target.free_text(), Some("quote?symbol=AAPL"));
        assert_eq!(target.output_shape(), TargetType::Timeseries);

        target.free_text = Some(String::new());
        assert_eq!(target.free_text(), None);
        assert_eq!(target.output_shape(), TargetType::Table);
    }

    #[test]
    fn test_symbol_uppercased() {
        let target = QueryTarget {
            symbol: " aapl ".to_string(),
            ..QueryTarget::default()
        };
        assert_eq!(target.normalized_symbol(), "AAPL");
    }

    #[test]
    fn test_target_deserialization_defaults() {
        let target: QueryTarget =
            serde_json::from_str(r#"{"refId": "A", "symbol": "msft"}"#).unwrap();
        assert_eq!(target.ref_id, "A");
        assert_eq!(target.kind, QueryKind::Profile);
        assert!(!target.hidden);

        let target: QueryTarget = serde_json::from_str(
            r#"{"refId": "B", "kind": "candle", "symbol": "msft", "resolution": "M"}"#,
        )
        .unwrap();
        assert_eq!(target.kind, QueryKind::Candle);
        assert_eq!(target.resolution, Some(Resolution::Month));
    }
}
