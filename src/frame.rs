//! Normalized output frames
//!
//! The uniform unit handed to the host platform: a frame carries the
//! originating target's `refId`, a visualization hint, and equal-length typed
//! fields. Table frames hold a single row; time-series frames hold one value
//! per sample.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

/// Value type of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Time,
    Number,
    String,
}

/// Preferred visualization for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visualization {
    Table,
    Graph,
}

/// One named column of a frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub values: Vec<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            field_type,
            values,
        }
    }
}

/// Normalized output unit delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub ref_id: String,
    pub visualization: Visualization,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new(ref_id: impl Into<String>, visualization: Visualization, fields: Vec<Field>) -> Self {
        Self {
            ref_id: ref_id.into(),
            visualization,
            fields,
        }
    }

    /// The placeholder frame for a no-data response: a single empty string
    /// field so the frame is never fieldless.
    pub fn empty(ref_id: &str, visualization: Visualization) -> Self {
        Self::new(
            ref_id,
            visualization,
            vec![Field::new("no data", FieldType::String, Vec::new())],
        )
    }
}

/// One event on the merged output channel.
///
/// The one-shot batch arrives exactly once with `key: None`; streaming
/// snapshots arrive keyed by their target's `refId`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEvent {
    pub data: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Coerce a scalar-or-array upstream value into an array.
///
/// Null becomes empty, arrays pass through, scalars wrap. Idempotent.
pub fn ensure_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Bounded time/value columns backing one streaming target.
///
/// Oldest sample is evicted once capacity is reached; both columns always
/// stay equal length.
#[derive(Debug)]
pub struct CircularSeries {
    capacity: usize,
    ts: VecDeque<i64>,
    values: VecDeque<f64>,
}

impl CircularSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ts: VecDeque::with_capacity(capacity),
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, ts: i64, value: f64) {
        if self.ts.len() == self.capacity {
            self.ts.pop_front();
            self.values.pop_front();
        }
        self.ts.push_back(ts);
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    /// Frame snapshot of the current buffer contents.
    pub fn snapshot(&self, ref_id: &str) -> Frame {
        Frame::new(
            ref_id,
            Visualization::Graph,
            vec![
                Field::new(
                    "ts",
                    FieldType::Time,
                    self.ts.iter().map(|&t| Value::from(t)).collect(),
                ),
                Field::new(
                    "value",
                    FieldType::Number,
                    self.values.iter().map(|&v| Value::from(v)).collect(),
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_array_coercion() {
        assert_eq!(ensure_array(&Value::Null), Vec::<Value>::new());
        assert_eq!(ensure_array(&json!(5)), vec![json!(5)]);
        assert_eq!(ensure_array(&json!("x")), vec![json!("x")]);
        assert_eq!(ensure_array(&json!([1, 2])), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_ensure_array_idempotent() {
        for value in [Value::Null, json!(5), json!("x"), json!([1, 2]), json!([])] {
            let once = ensure_array(&value);
            let twice = ensure_array(&Value::Array(once.clone()));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_empty_frame_has_placeholder_field() {
        let frame = Frame::empty("A", Visualization::Graph);
        assert_eq!(frame.ref_id, "A");
        assert_eq!(frame.fields.len(), 1);
        assert_eq!(frame.fields[0].name, "no data");
        assert_eq!(frame.fields[0].field_type, FieldType::String);
        assert!(frame.fields[0].values.is_empty());
    }

    #[test]
    fn test_circular_series_eviction() {
        let mut series = CircularSeries::new(3);
        for i in 0..5 {
            series.push(i, i as f64 * 10.0);
        }
        assert_eq!(series.len(), 3);

        let frame = series.snapshot("A");
        assert_eq!(frame.fields[0].values, vec![json!(2), json!(3), json!(4)]);
        assert_eq!(
            frame.fields[1].values,
            vec![json!(20.0), json!(30.0), json!(40.0)]
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let mut series = CircularSeries::new(10);
        series.push(1_700_000_000_000, 150.5);

        let frame = series.snapshot("T");
        assert_eq!(frame.visualization, Visualization::Graph);
        assert_eq!(frame.fields[0].name, "ts");
        assert_eq!(frame.fields[0].field_type, FieldType::Time);
        assert_eq!(frame.fields[1].name, "value");
        assert_eq!(frame.fields[1].field_type, FieldType::Number);
    }
}
