//! 라우팅 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<EngineError> for LogrouteError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 레코드 단위 처리(추출 실패, 필터 거부, 라우팅 실패)는 에러가 아니라
//! 결과값으로 표현됩니다. 이 타입은 로드 시점 설정 오류와 버퍼 I/O 오류에만 사용됩니다.

use logroute_core::error::{ConfigError, LogrouteError, PipelineError, SinkError};

/// 라우팅 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 파이프라인 정의 파일 로딩 실패
    #[error("pipeline load error: {path}: {reason}")]
    PipelineLoad {
        /// 정의 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 레이블 정의 오류 (미정의 참조, 중복 이름 등)
    #[error("label error: '{label}': {reason}")]
    Label {
        /// 문제가 된 레이블 이름
        label: String,
        /// 사유
        reason: String,
    },

    /// 출력 정의 오류
    #[error("output error: '{output}': {reason}")]
    Output {
        /// 문제가 된 출력 이름
        output: String,
        /// 사유
        reason: String,
    },

    /// 태그 패턴 문법 오류
    #[error("invalid tag pattern '{pattern}': {reason}")]
    Pattern {
        /// 원본 패턴
        pattern: String,
        /// 사유
        reason: String,
    },

    /// 스테이지 규칙/표현식 오류
    #[error("stage error: {context}: {reason}")]
    Stage {
        /// 위치 (레이블/스테이지/규칙)
        context: String,
        /// 사유
        reason: String,
    },

    /// 청크 저장소 에러
    #[error("chunk store error: {path}: {reason}")]
    Store {
        /// 관련 파일/디렉토리 경로
        path: String,
        /// 사유
        reason: String,
    },

    /// 허용되지 않는 청크 상태 전이
    #[error("invalid chunk transition for {chunk_id}: {from} -> {to}")]
    ChunkTransition {
        /// 청크 ID
        chunk_id: String,
        /// 현재 상태
        from: String,
        /// 요청된 상태
        to: String,
    },

    /// 외부 스토리지 전송 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<EngineError> for LogrouteError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                LogrouteError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::Sink(e) => LogrouteError::Sink(e),
            EngineError::Io(e) => LogrouteError::Io(e),
            other => LogrouteError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
