//! Response normalization
//!
//! Maps the per-kind upstream JSON shapes (flat objects, parallel arrays,
//! nested per-network arrays) into the uniform frame model. All time fields
//! are emitted as epoch milliseconds.

use crate::frame::{ensure_array, Field, FieldType, Frame, Visualization};
use crate::query::{QueryKind, QueryTarget, TargetType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::warn;

/// Candle response keys, in output order
const CANDLE_FIELDS: [&str; 6] = ["o", "h", "l", "c", "v", "t"];

/// Keys treated as time columns on the fallback path
const FALLBACK_TIME_KEYS: [&str; 3] = ["t", "time", "period"];

/// Normalize one upstream response into frames.
///
/// A no-data sentinel short-circuits to the placeholder empty frame whose
/// visualization matches the target's classified shape.
pub fn normalize(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let visualization = match target.output_shape() {
        TargetType::Table => Visualization::Table,
        TargetType::Timeseries => Visualization::Graph,
    };
    if is_no_data(data) {
        return vec![Frame::empty(&target.ref_id, visualization)];
    }

    if target.free_text().is_some() {
        return match target.output_shape() {
            TargetType::Table => table_frame(target, data),
            TargetType::Timeseries => fallback_frame(target, data),
        };
    }

    match &target.kind {
        QueryKind::Quote => quote_frame(target, data),
        QueryKind::Candle => candle_frame(target, data),
        QueryKind::Earnings => earnings_frame(target, data),
        QueryKind::SocialSentiment => sentiment_frames(target, data),
        QueryKind::Trades => vec![Frame::empty(&target.ref_id, Visualization::Graph)],
        _ => table_frame(target, data),
    }
}

/// Recognized "no results" shapes: null, a bare string payload, or an object
/// whose status field `s` equals `no_data`.
fn is_no_data(data: &Value) -> bool {
    match data {
        Value::Null | Value::String(_) => true,
        Value::Object(map) => map.get("s").and_then(Value::as_str) == Some("no_data"),
        _ => false,
    }
}

/// Flat key/value object as a single-row table.
fn table_frame(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let Some(map) = data.as_object() else {
        warn!(ref_id = %target.ref_id, "expected an object in a tabular response");
        return vec![Frame::empty(&target.ref_id, Visualization::Table)];
    };

    let fields = map
        .iter()
        .map(|(key, value)| {
            let field_type = if value.is_string() {
                FieldType::String
            } else {
                FieldType::Number
            };
            Field::new(key.clone(), field_type, vec![value.clone()])
        })
        .collect();

    vec![Frame::new(&target.ref_id, Visualization::Table, fields)]
}

/// Quote responses become a single-row table of the trade time and the
/// current price.
fn quote_frame(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let fields = vec![
        Field::new(
            "time",
            FieldType::Time,
            vec![seconds_to_millis(data.get("t").unwrap_or(&Value::Null))],
        ),
        Field::new(
            "current price",
            FieldType::Number,
            vec![data.get("c").cloned().unwrap_or(Value::Null)],
        ),
    ];
    vec![Frame::new(&target.ref_id, Visualization::Table, fields)]
}

/// Candle responses are parallel arrays keyed by OHLCV letter.
fn candle_frame(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let fields = CANDLE_FIELDS
        .iter()
        .map(|&key| {
            let column = ensure_array(data.get(key).unwrap_or(&Value::Null));
            if key == "t" {
                Field::new(
                    key,
                    FieldType::Time,
                    column.iter().map(seconds_to_millis).collect(),
                )
            } else {
                Field::new(key, FieldType::Number, column)
            }
        })
        .collect();

    vec![Frame::new(&target.ref_id, Visualization::Graph, fields)]
}

/// Earnings responses are arrays of uniform data points; `period` becomes the
/// time column, `symbol` is dropped.
fn earnings_frame(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let points = match data.as_array() {
        Some(points) if !points.is_empty() => points,
        _ => {
            warn!(ref_id = %target.ref_id, "earnings response carried no data points");
            return vec![Frame::empty(&target.ref_id, Visualization::Graph)];
        }
    };
    let Some(first) = points[0].as_object() else {
        warn!(ref_id = %target.ref_id, "earnings data points are not objects");
        return vec![Frame::empty(&target.ref_id, Visualization::Graph)];
    };

    let fields = first
        .keys()
        .filter(|key| key.as_str() != "symbol")
        .map(|key| {
            let values = points
                .iter()
                .map(|point| point.get(key).unwrap_or(&Value::Null));
            if key.as_str() == "period" {
                Field::new(key.clone(), FieldType::Time, values.map(date_millis).collect())
            } else {
                Field::new(key.clone(), FieldType::Number, values.cloned().collect())
            }
        })
        .collect();

    vec![Frame::new(&target.ref_id, Visualization::Graph, fields)]
}

/// Social-sentiment responses carry one record array per network; each
/// non-empty network becomes its own frame sharing the target's refId, with
/// field names suffixed by the network to keep them distinguishable.
fn sentiment_frames(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let Some(map) = data.as_object() else {
        warn!(ref_id = %target.ref_id, "expected an object in a social-sentiment response");
        return vec![Frame::empty(&target.ref_id, Visualization::Graph)];
    };

    map.iter()
        .filter(|(key, _)| key.as_str() != "symbol")
        .filter_map(|(network, entries)| {
            let points = entries.as_array()?;
            let first = points.first()?.as_object()?;

            let fields = first
                .keys()
                .map(|key| {
                    let name = format!("{key}-{network}");
                    let values = points
                        .iter()
                        .map(|point| point.get(key).unwrap_or(&Value::Null));
                    if key.as_str() == "atTime" {
                        Field::new(name, FieldType::Time, values.map(date_millis).collect())
                    } else {
                        Field::new(name, FieldType::Number, values.cloned().collect())
                    }
                })
                .collect();

            Some(Frame::new(&target.ref_id, Visualization::Graph, fields))
        })
        .collect()
}

/// Fallback for free-text responses classified as time series: every top-level
/// key becomes a field, with well-known time keys converted to milliseconds.
fn fallback_frame(target: &QueryTarget, data: &Value) -> Vec<Frame> {
    let Some(map) = data.as_object() else {
        warn!(ref_id = %target.ref_id, "expected an object in a free-text response");
        return vec![Frame::empty(&target.ref_id, Visualization::Graph)];
    };

    let fields = map
        .iter()
        .map(|(key, value)| {
            let values = ensure_array(value);
            if FALLBACK_TIME_KEYS.contains(&key.as_str()) {
                Field::new(
                    key.clone(),
                    FieldType::Time,
                    values.iter().map(seconds_to_millis).collect(),
                )
            } else {
                let field_type = match values.first() {
                    Some(Value::String(_)) => FieldType::String,
                    _ => FieldType::Number,
                };
                Field::new(key.clone(), field_type, values)
            }
        })
        .collect();

    vec![Frame::new(&target.ref_id, Visualization::Graph, fields)]
}

/// Epoch seconds to epoch milliseconds; non-numeric values become null.
fn seconds_to_millis(value: &Value) -> Value {
    if let Some(seconds) = value.as_i64() {
        Value::from(seconds * 1000)
    } else if let Some(seconds) = value.as_f64() {
        Value::from((seconds * 1000.0) as i64)
    } else {
        Value::Null
    }
}

/// Date-ish value to epoch milliseconds. Strings are parsed as RFC 3339,
/// `%Y-%m-%d %H:%M:%S`, or plain calendar dates; numbers are taken to already
/// be milliseconds.
fn date_millis(value: &Value) -> Value {
    match value {
        Value::String(text) => parse_date_millis(text).map(Value::from).unwrap_or(Value::Null),
        Value::Number(_) => value.clone(),
        _ => Value::Null,
    }
}

fn parse_date_millis(text: &str) -> Option<i64> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.timestamp_millis());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.and_utc().timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(kind: QueryKind) -> QueryTarget {
        QueryTarget {
            ref_id: "A".to_string(),
            kind,
            symbol: "AAPL".to_string(),
            ..QueryTarget::default()
        }
    }

    #[test]
    fn test_no_data_sentinels() {
        for data in [Value::Null, json!("no access"), json!({"s": "no_data"})] {
            for kind in [QueryKind::Profile, QueryKind::Candle] {
                let frames = normalize(&target(kind.clone()), &data);
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].fields.len(), 1);
                assert_eq!(frames[0].fields[0].name, "no data");
                assert!(frames[0].fields[0].values.is_empty());
            }
        }
    }

    #[test]
    fn test_placeholder_visualization_matches_shape() {
        let frames = normalize(&target(QueryKind::Profile), &Value::Null);
        assert_eq!(frames[0].visualization, Visualization::Table);

        let frames = normalize(&target(QueryKind::Quote), &Value::Null);
        assert_eq!(frames[0].visualization, Visualization::Graph);
    }

    #[test]
    fn test_profile_table() {
        let data = json!({"country": "US", "marketCapitalization": 1415.99, "name": "Apple Inc"});
        let frames = normalize(&target(QueryKind::Profile), &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.visualization, Visualization::Table);
        assert_eq!(frame.fields.len(), 3);
        for field in &frame.fields {
            assert_eq!(field.values.len(), 1);
        }

        let country = frame.fields.iter().find(|f| f.name == "country").unwrap();
        assert_eq!(country.field_type, FieldType::String);
        let cap = frame
            .fields
            .iter()
            .find(|f| f.name == "marketCapitalization")
            .unwrap();
        assert_eq!(cap.field_type, FieldType::Number);
    }

    #[test]
    fn test_quote_frame() {
        let data = json!({"c": 150.5, "h": 151.0, "l": 149.0, "o": 150.0, "pc": 149.5, "t": 1577854800});
        let frames = normalize(&target(QueryKind::Quote), &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.fields.len(), 2);
        assert_eq!(frame.fields[0].name, "time");
        assert_eq!(frame.fields[0].field_type, FieldType::Time);
        assert_eq!(frame.fields[0].values, vec![json!(1577854800000i64)]);
        assert_eq!(frame.fields[1].name, "current price");
        assert_eq!(frame.fields[1].values, vec![json!(150.5)]);
    }

    #[test]
    fn test_candle_frame() {
        let data = json!({
            "o": [296.24, 304.3],
            "h": [300.6, 304.39],
            "l": [295.19, 295.75],
            "c": [300.35, 297.43],
            "v": [33870100, 29375300],
            "t": [1577854800, 1580533200],
            "s": "ok"
        });
        let frames = normalize(&target(QueryKind::Candle), &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.visualization, Visualization::Graph);
        let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["o", "h", "l", "c", "v", "t"]);

        let t = frame.fields.iter().find(|f| f.name == "t").unwrap();
        assert_eq!(t.field_type, FieldType::Time);
        assert_eq!(t.values, vec![json!(1577854800000i64), json!(1580533200000i64)]);

        let o = frame.fields.iter().find(|f| f.name == "o").unwrap();
        assert_eq!(o.values, vec![json!(296.24), json!(304.3)]);
        for field in &frame.fields {
            assert_eq!(field.values.len(), t.values.len());
        }
    }

    #[test]
    fn test_earnings_frame() {
        let data = json!([
            {"actual": 1.25, "estimate": 1.10, "period": "2020-03-31", "symbol": "AAPL"},
            {"actual": 2.55, "estimate": 2.38, "period": "2019-12-31", "symbol": "AAPL"}
        ]);
        let frames = normalize(&target(QueryKind::Earnings), &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert!(frame.fields.iter().all(|f| f.name != "symbol"));

        let period = frame.fields.iter().find(|f| f.name == "period").unwrap();
        assert_eq!(period.field_type, FieldType::Time);
        assert_eq!(
            period.values,
            vec![json!(1585612800000i64), json!(1577750400000i64)]
        );

        let actual = frame.fields.iter().find(|f| f.name == "actual").unwrap();
        assert_eq!(actual.field_type, FieldType::Number);
        assert_eq!(actual.values, vec![json!(1.25), json!(2.55)]);
    }

    #[test]
    fn test_sentiment_skips_empty_networks() {
        let data = json!({
            "symbol": "GME",
            "reddit": [],
            "twitter": [
                {"atTime": "2020-03-01 00:00:00", "mention": 10, "score": 0.5},
                {"atTime": "2020-03-02 00:00:00", "mention": 25, "score": 0.6}
            ]
        });
        let frames = normalize(&target(QueryKind::SocialSentiment), &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.ref_id, "A");
        let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"atTime-twitter"));
        assert!(names.contains(&"mention-twitter"));
        assert!(names.iter().all(|name| !name.ends_with("-reddit")));

        let at_time = frame.fields.iter().find(|f| f.name == "atTime-twitter").unwrap();
        assert_eq!(at_time.field_type, FieldType::Time);
        assert_eq!(at_time.values.len(), 2);
        assert_eq!(at_time.values[0], json!(1583020800000i64));
    }

    #[test]
    fn test_metric_payload_as_table() {
        // The orchestrator unwraps the `metric` wrapper before normalizing.
        let data = json!({"10DayAverageTradingVolume": 32.36, "52WeekHigh": 310.43});
        let frames = normalize(&target(QueryKind::Metric), &data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].visualization, Visualization::Table);
        assert_eq!(frames[0].fields.len(), 2);
    }

    #[test]
    fn test_free_text_fallback_scales_time_keys() {
        let target = QueryTarget {
            ref_id: "F".to_string(),
            free_text: Some("quote?symbol=AAPL".to_string()),
            ..QueryTarget::default()
        };
        let data = json!({"c": 150.5, "t": 1577854800});
        let frames = normalize(&target, &data);
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        assert_eq!(frame.visualization, Visualization::Graph);
        let t = frame.fields.iter().find(|f| f.name == "t").unwrap();
        assert_eq!(t.field_type, FieldType::Time);
        assert_eq!(t.values, vec![json!(1577854800000i64)]);
        let c = frame.fields.iter().find(|f| f.name == "c").unwrap();
        assert_eq!(c.values, vec![json!(150.5)]);
    }

    #[test]
    fn test_free_text_table_shape() {
        let target = QueryTarget {
            ref_id: "G".to_string(),
            free_text: Some("stock/profile?symbol=AAPL".to_string()),
            ..QueryTarget::default()
        };
        let data = json!({"name": "Apple Inc", "shareOutstanding": 4375.48});
        let frames = normalize(&target, &data);
        assert_eq!(frames[0].visualization, Visualization::Table);
    }

    #[test]
    fn test_fallback_coerces_scalars_and_nulls() {
        let target = QueryTarget {
            ref_id: "H".to_string(),
            free_text: Some("quote?symbol=AAPL".to_string()),
            ..QueryTarget::default()
        };
        let data = json!({"c": 1.0, "d": null, "label": "x"});
        let frames = normalize(&target, &data);

        let frame = &frames[0];
        let d = frame.fields.iter().find(|f| f.name == "d").unwrap();
        assert!(d.values.is_empty());
        let label = frame.fields.iter().find(|f| f.name == "label").unwrap();
        assert_eq!(label.field_type, FieldType::String);
        assert_eq!(label.values, vec![json!("x")]);
    }

    #[test]
    fn test_parse_date_millis_formats() {
        assert_eq!(parse_date_millis("2020-03-31"), Some(1585612800000));
        assert_eq!(parse_date_millis("2020-03-01 00:00:00"), Some(1583020800000));
        assert_eq!(
            parse_date_millis("2020-03-01T00:00:00+00:00"),
            Some(1583020800000)
        );
        assert_eq!(parse_date_millis("not a date"), None);
    }
}
