//! 도메인 타입 — 파이프라인을 흐르는 레코드와 필드 값
//!
//! 모든 모듈이 공유하는 데이터 구조를 정의합니다.
//! 라우터, 스테이지, 싱크는 이 타입들을 사용하여 레코드를 교환합니다.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 레코드 필드 값
///
/// JSON 스칼라에 대응합니다. 중첩 객체/배열은 수집 단계에서
/// JSON 텍스트 문자열로 보존됩니다 ([`FieldValue::from_json`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// null
    Null,
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 실수
    Float(f64),
    /// 문자열
    Str(String),
}

impl FieldValue {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// null 여부를 확인합니다.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 패턴 매칭에 사용할 텍스트 표현을 반환합니다.
    ///
    /// null은 `None`입니다. 불리언은 `"true"`/`"false"`, 숫자는 10진 표기입니다.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Self::Int(i) => Some(Cow::Owned(i.to_string())),
            Self::Float(f) => Some(Cow::Owned(f.to_string())),
            Self::Str(s) => Some(Cow::Borrowed(s)),
        }
    }

    /// 조건식 평가용 진리값을 반환합니다.
    ///
    /// - null, 빈 문자열, `"false"`, `0` 은 거짓
    /// - 그 외는 참
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty() && s != "false",
        }
    }

    /// `serde_json::Value`를 필드 값으로 변환합니다.
    ///
    /// 객체와 배열은 JSON 텍스트로 직렬화하여 문자열로 보존합니다.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Str(other.to_string())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// 파이프라인 레코드
///
/// 태그로 라우팅되는 데이터 단위입니다. `id`는 수집 시 한 번 부여되며
/// 재시도 시 외부 스토리지의 중복 제거 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 레코드 고유 ID (UUID v4)
    pub id: String,
    /// 현재 라우팅 태그 (재작성 시 재라우팅)
    pub tag: String,
    /// 이벤트 시각 (수집 시 부여)
    pub timestamp: SystemTime,
    /// 필드 맵 (키 유일)
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// 새 레코드를 생성합니다. ID와 타임스탬프가 자동 부여됩니다.
    pub fn new(tag: impl Into<String>, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tag: tag.into(),
            timestamp: SystemTime::now(),
            fields,
        }
    }

    /// 필드가 비어 있는 레코드를 생성합니다.
    pub fn empty(tag: impl Into<String>) -> Self {
        Self::new(tag, BTreeMap::new())
    }

    /// 고정 ID를 지정합니다 (결정적 테스트, 복구 시 사용).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 타임스탬프를 지정합니다.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 필드를 추가합니다 (빌더 형태).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 필드 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// 문자열 필드 값을 조회합니다.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_str)
    }

    /// 필드 값을 설정합니다. 기존 값은 덮어씁니다.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// 필드를 제거하고 이전 값을 반환합니다.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({} fields)", self.tag, self.id, self.fields.len())
    }
}
