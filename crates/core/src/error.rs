//! 에러 타입 — 도메인별 에러 정의

/// logroute 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogrouteError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 출력 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 출력 싱크(외부 스토리지) 에러
///
/// 배치 단위 전송 실패를 나타냅니다. 모든 변형은 재시도 대상이며,
/// 재시도 한도를 초과하면 청크가 격리(quarantine)됩니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 연결 실패 (DNS, TCP, TLS 등)
    #[error("connection failed: {0}")]
    Connection(String),

    /// 요청 타임아웃
    #[error("request timed out: {0}")]
    Timeout(String),

    /// 2xx 이외의 응답
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// 응답 형식 오류 (파싱 불가 등)
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SinkError {
    /// 메트릭 레이블에 사용하는 짧은 분류명을 반환합니다.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Protocol(_) => "protocol",
        }
    }
}
