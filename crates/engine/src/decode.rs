//! 페이로드 디코더 -- 원시 페이로드를 [`Record`]로 변환합니다.
//!
//! 디코딩은 실패하지 않습니다. 구조화되지 않은 입력도 최소한의 유효한 레코드가 됩니다.
//!
//! | 입력 | 결과 `fields` | 종류 |
//! |------|---------------|------|
//! | JSON 객체 | 객체의 필드 | [`PayloadKind::Object`] |
//! | 그 외 UTF-8 텍스트 | `log` = 텍스트 | [`PayloadKind::Text`] |
//! | UTF-8이 아닌 바이트 | `log` = lossy 텍스트 | [`PayloadKind::Invalid`] |
//! | 빈 입력/공백 | 비어 있음 | [`PayloadKind::Empty`] |
//! | 크기 초과 | 비어 있음 | [`PayloadKind::Oversize`] |
//!
//! 중첩 객체와 배열은 JSON 텍스트 문자열로 보존됩니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::SystemTime;

use logroute_core::types::{FieldValue, Record};

/// 비정형 텍스트를 담는 필드 이름
pub const FREE_TEXT_FIELD: &str = "log";

/// 태그별 마지막 타임스탬프 추적 상한 (초과 시 초기화)
const MAX_TRACKED_TAGS: usize = 10_000;

/// 입력 페이로드 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// JSON 객체
    Object,
    /// 비정형 텍스트 (유효한 UTF-8)
    Text,
    /// UTF-8이 아닌 바이트
    Invalid,
    /// 빈 입력
    Empty,
    /// 크기 제한 초과
    Oversize,
}

impl PayloadKind {
    /// 잘못된 형식(malformed)으로 계수해야 하는지 여부
    pub fn is_malformed(self) -> bool {
        matches!(self, Self::Invalid | Self::Empty | Self::Oversize)
    }
}

/// 디코딩 결과
#[derive(Debug, Clone)]
pub struct Decoded {
    /// 생성된 레코드
    pub record: Record,
    /// 입력 분류
    pub kind: PayloadKind,
}

/// 페이로드 디코더
///
/// 여러 생산자 태스크에서 공유됩니다. 태그별 타임스탬프 단조성 보장을 위해
/// 마지막 타임스탬프를 내부에 보관합니다.
pub struct PayloadDecoder {
    max_payload_bytes: usize,
    last_timestamps: Mutex<HashMap<String, SystemTime>>,
}

impl PayloadDecoder {
    /// 새 디코더를 생성합니다.
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            max_payload_bytes,
            last_timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// 페이로드를 디코딩합니다.
    pub fn decode(&self, tag: &str, raw: &[u8]) -> Decoded {
        let (fields, kind) = self.decode_fields(raw);
        let mut record = Record::new(tag, fields);
        record.timestamp = self.clamp_timestamp(tag, record.timestamp);
        Decoded { record, kind }
    }

    /// 태그 단위로 타임스탬프가 감소하지 않도록 보정합니다.
    fn clamp_timestamp(&self, tag: &str, now: SystemTime) -> SystemTime {
        let mut last = self
            .last_timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if last.len() >= MAX_TRACKED_TAGS && !last.contains_key(tag) {
            last.clear();
        }

        match last.get_mut(tag) {
            Some(prev) if *prev > now => *prev,
            Some(prev) => {
                *prev = now;
                now
            }
            None => {
                last.insert(tag.to_owned(), now);
                now
            }
        }
    }

    fn decode_fields(&self, raw: &[u8]) -> (BTreeMap<String, FieldValue>, PayloadKind) {
        if raw.len() > self.max_payload_bytes {
            tracing::debug!(
                size = raw.len(),
                max = self.max_payload_bytes,
                "payload exceeds size limit, emitting empty record"
            );
            return (BTreeMap::new(), PayloadKind::Oversize);
        }

        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(_) => {
                let lossy = String::from_utf8_lossy(raw);
                let trimmed = lossy.trim();
                if trimmed.is_empty() {
                    return (BTreeMap::new(), PayloadKind::Empty);
                }
                return (free_text(trimmed), PayloadKind::Invalid);
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return (BTreeMap::new(), PayloadKind::Empty);
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => {
                let fields = map
                    .into_iter()
                    .map(|(key, value)| (key, FieldValue::from_json(value)))
                    .collect();
                (fields, PayloadKind::Object)
            }
            // 스칼라/배열 JSON과 비JSON 텍스트는 모두 비정형 로그 한 줄로 취급
            _ => (free_text(trimmed), PayloadKind::Text),
        }
    }
}

fn free_text(text: &str) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert(FREE_TEXT_FIELD.to_owned(), FieldValue::from(text));
    fields
}
