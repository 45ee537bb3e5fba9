//! 파이프라인 정의 파일 데이터 타입
//!
//! `pipeline_dir` 아래 YAML 파일에서 역직렬화되는 구조체들입니다.
//! 여러 파일의 정의는 경로 순서대로 병합됩니다 (`conf.d/` 방식).

use serde::Deserialize;

use crate::config::BufferOverrides;
use crate::error::EngineError;
use crate::stage::StageSpec;

/// 파이프라인 정의 파일 하나
///
/// # YAML 스키마
/// ```yaml
/// bindings:
///   - { pattern: "order.**", label: ORDER_APP }
/// labels:
///   - name: "@ORDER_APP"
///     stages:
///       - transform: { set: [ { field: service_name, value: order-app } ] }
///   - name: ORDER_APP_NORMAL
///     output: opensearch_main
/// outputs:
///   - name: opensearch_main
///     type: opensearch
///     opensearch:
///       endpoint: http://opensearch:9200
///       logstash_prefix: order-app
///     buffer:
///       flush_bytes: 1048576
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineFile {
    /// 태그 패턴 → 레이블 바인딩 (선언 순서가 동률 우선순위)
    pub bindings: Vec<BindingDef>,
    /// 레이블 정의
    pub labels: Vec<LabelDef>,
    /// 출력 정의
    pub outputs: Vec<OutputDef>,
}

impl PipelineFile {
    /// 다른 파일의 정의를 뒤에 이어 붙입니다.
    pub fn merge(&mut self, other: PipelineFile) {
        self.bindings.extend(other.bindings);
        self.labels.extend(other.labels);
        self.outputs.extend(other.outputs);
    }
}

/// 태그 바인딩
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingDef {
    /// 태그 패턴
    pub pattern: String,
    /// 대상 레이블
    pub label: String,
}

/// 레이블 정의
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelDef {
    /// 레이블 이름 (선행 `@`는 무시)
    pub name: String,
    /// 순서가 있는 스테이지 목록 (`- transform: {...}` 단일 키 맵 형식)
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub stages: Vec<StageSpec>,
    /// 스테이지 끝에서 레코드를 넘길 출력 이름
    #[serde(default)]
    pub output: Option<String>,
}

/// 출력 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// OpenSearch/Elasticsearch `_bulk` API
    Opensearch,
    /// 표준 출력 NDJSON
    Stdout,
    /// 프로세스 내부 저장소
    Memory,
}

impl OutputType {
    /// 종류 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opensearch => "opensearch",
            Self::Stdout => "stdout",
            Self::Memory => "memory",
        }
    }
}

/// 출력 정의
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDef {
    /// 출력 이름 (청크 저장 디렉토리 이름으로도 사용)
    pub name: String,
    /// 출력 종류
    #[serde(rename = "type")]
    pub output_type: OutputType,
    /// `opensearch` 종류 설정
    #[serde(default)]
    pub opensearch: Option<OpenSearchSpec>,
    /// 버퍼 설정 덮어쓰기
    #[serde(default)]
    pub buffer: BufferOverrides,
}

impl OutputDef {
    /// 출력 정의의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        let err = |reason: &str| EngineError::Output {
            output: self.name.clone(),
            reason: reason.to_owned(),
        };

        if self.name.is_empty() {
            return Err(err("output name must not be empty"));
        }
        // 디렉토리 이름으로 쓰이므로 경로 구분자 금지
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            || self.name.starts_with('.')
        {
            return Err(err("output name may only contain [A-Za-z0-9_.-]"));
        }
        if self.name == crate::sink::store::QUARANTINE_DIR {
            return Err(err("output name is reserved"));
        }

        match (self.output_type, &self.opensearch) {
            (OutputType::Opensearch, None) => Err(err("type opensearch requires an 'opensearch' section")),
            (OutputType::Opensearch, Some(spec)) => spec.validate().map_err(|reason| err(&reason)),
            (_, Some(_)) => Err(err("'opensearch' section is only valid for type opensearch")),
            (_, None) => Ok(()),
        }
    }
}

/// OpenSearch 출력 설정
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenSearchSpec {
    /// 클러스터 URL (`http://host:9200`)
    pub endpoint: String,
    /// 고정 인덱스 이름
    #[serde(default)]
    pub index: Option<String>,
    /// 날짜 인덱스 접두어 (`{prefix}-YYYY.MM.DD`)
    #[serde(default)]
    pub logstash_prefix: Option<String>,
    /// basic auth 사용자
    #[serde(default)]
    pub user: Option<String>,
    /// basic auth 비밀번호
    #[serde(default)]
    pub password: Option<String>,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl OpenSearchSpec {
    fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!("endpoint must be an http(s) URL: '{}'", self.endpoint));
        }
        match (&self.index, &self.logstash_prefix) {
            (Some(_), Some(_)) => return Err("set only one of 'index' or 'logstash_prefix'".to_owned()),
            (None, None) => return Err("one of 'index' or 'logstash_prefix' is required".to_owned()),
            (Some(name), None) | (None, Some(name)) if name.is_empty() => {
                return Err("index name must not be empty".to_owned());
            }
            _ => {}
        }
        if self.password.is_some() && self.user.is_none() {
            return Err("'password' requires 'user'".to_owned());
        }
        if self.timeout_secs == 0 || self.timeout_secs > 600 {
            return Err("timeout_secs must be 1-600".to_owned());
        }
        Ok(())
    }
}
