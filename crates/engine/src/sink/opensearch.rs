//! OpenSearch 출력 -- `_bulk` API 전송
//!
//! 각 레코드는 `create` 액션으로 전송되며 `_id`는 레코드 ID입니다.
//! 재전송된 레코드는 409(version conflict)로 응답되므로 승인으로 취급합니다.
//!
//! # 항목별 응답 분류
//! | status              | 처리        |
//! |---------------------|-------------|
//! | 2xx, 409            | 승인        |
//! | 429, 5xx            | 재시도      |
//! | 그 외 4xx           | 영구 거부   |

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use logroute_core::error::SinkError;
use logroute_core::types::{FieldValue, Record};

use crate::error::EngineError;
use crate::label::OpenSearchSpec;

use super::{BulkOutcome, BulkSink};

/// 문서 타임스탬프 필드
pub const TIMESTAMP_FIELD: &str = "@timestamp";

const BODY_PREVIEW_LIMIT: usize = 512;

/// 인덱스 결정 방식
#[derive(Debug, Clone, PartialEq, Eq)]
enum IndexTarget {
    Fixed(String),
    Daily(String),
}

impl IndexTarget {
    fn for_record(&self, record: &Record) -> String {
        match self {
            Self::Fixed(name) => name.clone(),
            Self::Daily(prefix) => {
                let ts: DateTime<Utc> = record.timestamp.into();
                format!("{prefix}-{}", ts.format("%Y.%m.%d"))
            }
        }
    }
}

/// OpenSearch bulk 싱크
#[derive(Debug, Clone)]
pub struct OpenSearchSink {
    client: reqwest::Client,
    bulk_url: String,
    index: IndexTarget,
    auth: Option<(String, Option<String>)>,
}

impl OpenSearchSink {
    /// 출력 설정으로 클라이언트를 생성합니다.
    pub fn new(spec: &OpenSearchSpec) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.timeout_secs))
            .build()
            .map_err(|e| EngineError::Output {
                output: spec.endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let index = match (&spec.index, &spec.logstash_prefix) {
            (Some(index), _) => IndexTarget::Fixed(index.clone()),
            (None, Some(prefix)) => IndexTarget::Daily(prefix.clone()),
            (None, None) => {
                return Err(EngineError::Output {
                    output: spec.endpoint.clone(),
                    reason: "one of 'index' or 'logstash_prefix' is required".to_owned(),
                });
            }
        };

        Ok(Self {
            client,
            bulk_url: format!("{}/_bulk", spec.endpoint.trim_end_matches('/')),
            index,
            auth: spec.user.clone().map(|user| (user, spec.password.clone())),
        })
    }

    /// bulk 요청 URL
    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }

    fn body(&self, records: &[Record]) -> Result<Vec<u8>, SinkError> {
        build_bulk_body(records, |record| self.index.for_record(record))
    }
}

impl BulkSink for OpenSearchSink {
    fn kind(&self) -> &'static str {
        "opensearch"
    }

    async fn send_bulk(&self, records: &[Record]) -> Result<BulkOutcome, SinkError> {
        if records.is_empty() {
            return Ok(BulkOutcome::all_acked());
        }

        let mut request = self
            .client
            .post(&self.bulk_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(self.body(records)?);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_deref());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: preview(&bytes),
            });
        }

        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SinkError::Protocol(format!("invalid bulk response: {e}")))?;
        classify_bulk_response(&body, records.len())
    }
}

/// 레코드를 OpenSearch 문서로 변환합니다 (필드 + `@timestamp`).
pub fn document(record: &Record) -> Value {
    let mut doc = Map::with_capacity(record.fields.len() + 1);
    for (key, value) in &record.fields {
        doc.insert(key.clone(), field_to_json(value));
    }
    if !doc.contains_key(TIMESTAMP_FIELD) {
        let ts: DateTime<Utc> = record.timestamp.into();
        doc.insert(
            TIMESTAMP_FIELD.to_owned(),
            Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    Value::Object(doc)
}

fn field_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::from(*b),
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldValue::Str(s) => Value::from(s.as_str()),
    }
}

/// `_bulk` 요청 본문을 생성합니다 (레코드당 액션 줄 + 문서 줄).
pub fn build_bulk_body(
    records: &[Record],
    index_for: impl Fn(&Record) -> String,
) -> Result<Vec<u8>, SinkError> {
    let mut body = Vec::with_capacity(records.len() * 256);
    for record in records {
        let action = json!({ "create": { "_index": index_for(record), "_id": record.id } });
        serde_json::to_writer(&mut body, &action)
            .map_err(|e| SinkError::Protocol(format!("failed to encode action: {e}")))?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, &document(record))
            .map_err(|e| SinkError::Protocol(format!("failed to encode document: {e}")))?;
        body.push(b'\n');
    }
    Ok(body)
}

/// `_bulk` 응답을 항목별로 분류합니다.
pub fn classify_bulk_response(body: &Value, expected: usize) -> Result<BulkOutcome, SinkError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SinkError::Protocol("bulk response has no 'items' array".to_owned()))?;

    if items.len() != expected {
        return Err(SinkError::Protocol(format!(
            "bulk response item count mismatch: expected {expected}, got {}",
            items.len()
        )));
    }

    // errors=false면 모두 승인
    if body.get("errors").and_then(Value::as_bool) == Some(false) {
        return Ok(BulkOutcome::all_acked());
    }

    let mut outcome = BulkOutcome::all_acked();
    for (index, item) in items.iter().enumerate() {
        let result = item
            .as_object()
            .and_then(|actions| actions.values().next())
            .ok_or_else(|| SinkError::Protocol(format!("malformed bulk item at {index}")))?;
        let status = result
            .get("status")
            .and_then(Value::as_u64)
            .ok_or_else(|| SinkError::Protocol(format!("bulk item {index} has no status")))?;

        match status {
            200..=299 | 409 => {}
            429 | 500..=599 => outcome.retry.push(index),
            _ => outcome.rejected.push((index, item_error(result, status))),
        }
    }
    Ok(outcome)
}

fn item_error(result: &Value, status: u64) -> String {
    let error = result.get("error");
    let kind = error
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    match error.and_then(|e| e.get("reason")).and_then(Value::as_str) {
        Some(reason) => format!("{status} {kind}: {reason}"),
        None => format!("{status} {kind}"),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SinkError {
    if err.is_timeout() {
        SinkError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        SinkError::Connection(err.to_string())
    } else {
        SinkError::Protocol(err.to_string())
    }
}

fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(BODY_PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn spec() -> OpenSearchSpec {
        OpenSearchSpec {
            endpoint: "http://localhost:9200/".to_owned(),
            index: None,
            logstash_prefix: Some("order-app".to_owned()),
            user: Some("admin".to_owned()),
            password: Some("secret".to_owned()),
            timeout_secs: 5,
        }
    }

    fn record_at(secs: u64) -> Record {
        Record::empty("order.app")
            .with_id("r-1")
            .with_timestamp(UNIX_EPOCH + Duration::from_secs(secs))
            .with_field("order_id", "A-1")
            .with_field("qty", 3_i64)
    }

    #[test]
    fn daily_index_uses_record_date() {
        let sink = OpenSearchSink::new(&spec()).unwrap();
        assert_eq!(sink.bulk_url(), "http://localhost:9200/_bulk");
        // 2024-03-05T00:00:00Z
        let record = record_at(1_709_596_800);
        assert_eq!(sink.index.for_record(&record), "order-app-2024.03.05");
    }

    #[test]
    fn bulk_body_pairs_action_and_document() {
        let body = build_bulk_body(&[record_at(0)], |_| "logs".to_owned()).unwrap();
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["create"]["_index"], "logs");
        assert_eq!(lines[0]["create"]["_id"], "r-1");
        assert_eq!(lines[1]["order_id"], "A-1");
        assert_eq!(lines[1]["qty"], 3);
        assert_eq!(lines[1][TIMESTAMP_FIELD], "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn existing_timestamp_field_is_kept() {
        let record = record_at(0).with_field(TIMESTAMP_FIELD, "2020-01-01T00:00:00Z");
        assert_eq!(document(&record)[TIMESTAMP_FIELD], "2020-01-01T00:00:00Z");
    }

    #[test]
    fn classify_all_ok() {
        let body = json!({ "errors": false, "items": [ { "create": { "status": 201 } } ] });
        assert_eq!(classify_bulk_response(&body, 1).unwrap(), BulkOutcome::all_acked());
    }

    #[test]
    fn classify_mixed_items() {
        let body = json!({
            "errors": true,
            "items": [
                { "create": { "status": 201 } },
                { "create": { "status": 409, "error": { "type": "version_conflict_engine_exception" } } },
                { "create": { "status": 429, "error": { "type": "es_rejected_execution_exception" } } },
                { "create": { "status": 503 } },
                { "create": { "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } }
            ]
        });
        let outcome = classify_bulk_response(&body, 5).unwrap();
        assert_eq!(outcome.retry, vec![2, 3]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, 4);
        assert!(outcome.rejected[0].1.contains("mapper_parsing_exception"));
        assert_eq!(outcome.acked_count(5), 2);
    }

    #[test]
    fn classify_count_mismatch_is_protocol_error() {
        let body = json!({ "errors": false, "items": [] });
        let err = classify_bulk_response(&body, 2).unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let long = "x".repeat(BODY_PREVIEW_LIMIT + 10);
        let p = preview(long.as_bytes());
        assert!(p.ends_with("..."));
        assert_eq!(p.len(), BODY_PREVIEW_LIMIT + 3);
    }
}
