//! 설정 관리 — logroute.toml 파싱 및 런타임 설정
//!
//! [`LogrouteConfig`]는 데몬과 엔진의 설정을 담는 최상위 구조체입니다.
//! 레이블/바인딩/스테이지/출력 정의는 TOML이 아니라
//! `router.pipeline_dir`의 YAML 파일에서 로드합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGROUTE_ROUTER_MAX_HOPS=4` 형식)
//! 3. 설정 파일 (`logroute.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logroute_core::error::LogrouteError> {
//! use logroute_core::config::LogrouteConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogrouteConfig::load("logroute.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogrouteConfig::parse("[router]\nmax_hops = 4")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogrouteError};

/// 레코드 한 건 페이로드 기본 상한 (1 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// 청크 플러시 기본 크기 임계값 (2 MiB)
pub const DEFAULT_FLUSH_BYTES: usize = 2 * 1024 * 1024;

/// 재라우팅 홉 상한의 최대 허용값
const MAX_HOPS_UPPER: u32 = 64;

/// logroute 통합 설정
///
/// `logroute.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogrouteConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 라우터 설정
    #[serde(default)]
    pub router: RouterConfig,
    /// 출력 버퍼 설정
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl LogrouteConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogrouteError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogrouteError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogrouteError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogrouteError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogrouteError> {
        toml::from_str(toml_str).map_err(|e| {
            LogrouteError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGROUTE_{SECTION}_{FIELD}`
    /// 예: `LOGROUTE_BUFFER_RETRY_LIMIT=5`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGROUTE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGROUTE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LOGROUTE_GENERAL_DATA_DIR");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGROUTE_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "LOGROUTE_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "LOGROUTE_METRICS_PORT");

        // Router
        override_string(
            &mut self.router.pipeline_dir,
            "LOGROUTE_ROUTER_PIPELINE_DIR",
        );
        override_u32(&mut self.router.max_hops, "LOGROUTE_ROUTER_MAX_HOPS");
        override_string(
            &mut self.router.default_label,
            "LOGROUTE_ROUTER_DEFAULT_LABEL",
        );
        override_usize(
            &mut self.router.max_payload_bytes,
            "LOGROUTE_ROUTER_MAX_PAYLOAD_BYTES",
        );
        override_usize(
            &mut self.router.intake_channel_capacity,
            "LOGROUTE_ROUTER_INTAKE_CHANNEL_CAPACITY",
        );
        override_string(
            &mut self.router.backpressure,
            "LOGROUTE_ROUTER_BACKPRESSURE",
        );

        // Buffer
        override_string(
            &mut self.buffer.storage_path,
            "LOGROUTE_BUFFER_STORAGE_PATH",
        );
        override_usize(&mut self.buffer.flush_bytes, "LOGROUTE_BUFFER_FLUSH_BYTES");
        override_u64(
            &mut self.buffer.flush_interval_secs,
            "LOGROUTE_BUFFER_FLUSH_INTERVAL_SECS",
        );
        override_u32(&mut self.buffer.retry_limit, "LOGROUTE_BUFFER_RETRY_LIMIT");
        override_u64(
            &mut self.buffer.retry_backoff_base_ms,
            "LOGROUTE_BUFFER_RETRY_BACKOFF_BASE_MS",
        );
        override_u64(
            &mut self.buffer.retry_backoff_max_ms,
            "LOGROUTE_BUFFER_RETRY_BACKOFF_MAX_MS",
        );
        override_usize(
            &mut self.buffer.max_pending_chunks,
            "LOGROUTE_BUFFER_MAX_PENDING_CHUNKS",
        );
        override_u64(
            &mut self.buffer.shutdown_grace_secs,
            "LOGROUTE_BUFFER_SHUTDOWN_GRACE_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogrouteError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when enabled"));
        }

        if self.router.max_hops == 0 || self.router.max_hops > MAX_HOPS_UPPER {
            return Err(invalid(
                "router.max_hops",
                format!("must be 1-{MAX_HOPS_UPPER}"),
            ));
        }

        if self.router.max_payload_bytes == 0 {
            return Err(invalid("router.max_payload_bytes", "must be greater than 0"));
        }

        if self.router.intake_channel_capacity == 0 {
            return Err(invalid(
                "router.intake_channel_capacity",
                "must be greater than 0",
            ));
        }

        let valid_modes = ["block", "reject"];
        if !valid_modes.contains(&self.router.backpressure.as_str()) {
            return Err(invalid(
                "router.backpressure",
                format!("must be one of: {}", valid_modes.join(", ")),
            ));
        }

        if self.buffer.storage_path.is_empty() {
            return Err(invalid("buffer.storage_path", "must not be empty"));
        }

        if self.buffer.flush_bytes == 0 {
            return Err(invalid("buffer.flush_bytes", "must be greater than 0"));
        }

        if self.buffer.flush_interval_secs == 0 {
            return Err(invalid(
                "buffer.flush_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.buffer.retry_backoff_base_ms > self.buffer.retry_backoff_max_ms {
            return Err(invalid(
                "buffer.retry_backoff_base_ms",
                "must not exceed retry_backoff_max_ms",
            ));
        }

        if self.buffer.max_pending_chunks == 0 {
            return Err(invalid(
                "buffer.max_pending_chunks",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogrouteError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/logroute".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 노출 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 라우터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// 레이블 정의 YAML 디렉토리
    pub pipeline_dir: String,
    /// 재라우팅 최대 홉 수
    pub max_hops: u32,
    /// 매칭되는 바인딩이 없을 때 사용할 레이블 (빈 문자열이면 드롭)
    pub default_label: String,
    /// 페이로드 최대 크기 (바이트)
    pub max_payload_bytes: usize,
    /// 출력별 수집 채널 용량
    pub intake_channel_capacity: usize,
    /// 백프레셔 모드 (block, reject)
    pub backpressure: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pipeline_dir: "/etc/logroute/conf.d".to_owned(),
            max_hops: 8,
            default_label: String::new(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            intake_channel_capacity: 1024,
            backpressure: "block".to_owned(),
        }
    }
}

/// 출력 버퍼 설정
///
/// 레이블 YAML의 출력 정의에서 출력별로 일부 값을 덮어쓸 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// 청크 저장 경로
    pub storage_path: String,
    /// 청크 크기 임계값 (바이트)
    pub flush_bytes: usize,
    /// 청크 최대 보관 시간 (초)
    pub flush_interval_secs: u64,
    /// 최초 시도 이후 재시도 횟수
    pub retry_limit: u32,
    /// 재시도 백오프 기준값 (밀리초)
    pub retry_backoff_base_ms: u64,
    /// 재시도 백오프 상한 (밀리초)
    pub retry_backoff_max_ms: u64,
    /// 승인 대기 청크 최대 개수
    pub max_pending_chunks: usize,
    /// 종료 시 최종 플러시 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            storage_path: "/var/lib/logroute/buffer".to_owned(),
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval_secs: 5,
            retry_limit: 3,
            retry_backoff_base_ms: 1_000,
            retry_backoff_max_ms: 30_000,
            max_pending_chunks: 25,
            shutdown_grace_secs: 10,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}
