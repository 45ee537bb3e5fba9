//! 표준 출력 -- 레코드를 NDJSON으로 출력 (디버깅용)

use tokio::io::AsyncWriteExt;

use logroute_core::error::SinkError;
use logroute_core::types::Record;

use super::opensearch::document;
use super::{BulkOutcome, BulkSink};

/// 표준 출력 싱크
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl StdoutSink {
    /// 생성
    pub fn new() -> Self {
        Self
    }
}

/// 레코드 배치를 출력용 NDJSON으로 변환합니다 (`tag` 포함).
pub fn render(records: &[Record]) -> Result<Vec<u8>, SinkError> {
    let mut out = Vec::new();
    for record in records {
        let mut doc = document(record);
        if let Some(map) = doc.as_object_mut() {
            map.insert("tag".to_owned(), serde_json::Value::from(record.tag.clone()));
        }
        serde_json::to_writer(&mut out, &doc)
            .map_err(|e| SinkError::Protocol(format!("failed to encode record: {e}")))?;
        out.push(b'\n');
    }
    Ok(out)
}

impl BulkSink for StdoutSink {
    fn kind(&self) -> &'static str {
        "stdout"
    }

    async fn send_bulk(&self, records: &[Record]) -> Result<BulkOutcome, SinkError> {
        let body = render(records)?;
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&body)
            .await
            .map_err(|e| SinkError::Connection(format!("stdout write failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| SinkError::Connection(format!("stdout flush failed: {e}")))?;
        Ok(BulkOutcome::all_acked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_emits_one_line_per_record() {
        let records = vec![
            Record::empty("app.log").with_field("msg", "a"),
            Record::empty("app.log").with_field("msg", "b"),
        ];
        let body = render(&records).unwrap();
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["tag"], "app.log");
        assert_eq!(first["msg"], "a");
        assert!(first["@timestamp"].is_string());
    }
}
