//! 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`LogrouteConfig`](logroute_core::config::LogrouteConfig)
//! `[router]`/`[buffer]` 섹션을 기반으로 엔진 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logroute_core::config::LogrouteConfig;
//! use logroute_engine::config::EngineConfig;
//!
//! let core_config = LogrouteConfig::default();
//! let config = EngineConfig::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use logroute_core::config::{DEFAULT_FLUSH_BYTES, DEFAULT_MAX_PAYLOAD_BYTES, LogrouteConfig};

use crate::error::EngineError;

const MAX_HOPS_UPPER: u32 = 64;
const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(3600);

/// 출력 수집 채널이 가득 찼을 때의 동작
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackpressureMode {
    /// 채널에 여유가 생길 때까지 대기 (기본값)
    #[default]
    Block,
    /// 즉시 거부하고 `IngestOutcome::Rejected` 반환
    Reject,
}

impl FromStr for BackpressureMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(EngineError::Config {
                field: "backpressure".to_owned(),
                reason: format!("unknown mode '{other}', expected block or reject"),
            }),
        }
    }
}

/// 출력 버퍼(싱크 워커) 설정
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// 청크 저장 루트 경로
    pub storage_path: PathBuf,
    /// 청크 봉인 크기 임계값 (바이트, 이상이면 봉인)
    pub flush_bytes: usize,
    /// 청크 최대 보관 시간
    pub flush_interval: Duration,
    /// 최초 시도 이후 재시도 횟수
    pub retry_limit: u32,
    /// 재시도 백오프 기준값
    pub backoff_base: Duration,
    /// 재시도 백오프 상한
    pub backoff_max: Duration,
    /// 승인 대기 청크 최대 개수 (초과 시 수집 중단)
    pub max_pending_chunks: usize,
    /// 종료 시 최종 플러시 유예 시간
    pub shutdown_grace: Duration,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("/var/lib/logroute/buffer"),
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: Duration::from_secs(5),
            retry_limit: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_pending_chunks: 25,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// 출력 정의(YAML)에서 지정하는 버퍼 설정 덮어쓰기
///
/// 지정하지 않은 필드는 `[buffer]` 섹션 값을 따릅니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferOverrides {
    /// 청크 크기 임계값 (바이트)
    pub flush_bytes: Option<usize>,
    /// 청크 최대 보관 시간 (초)
    pub flush_interval_secs: Option<u64>,
    /// 재시도 횟수
    pub retry_limit: Option<u32>,
    /// 승인 대기 청크 최대 개수
    pub max_pending_chunks: Option<usize>,
}

impl SinkSettings {
    /// 출력별 덮어쓰기를 적용한 설정을 반환합니다.
    pub fn with_overrides(&self, overrides: &BufferOverrides) -> Self {
        let mut settings = self.clone();
        if let Some(bytes) = overrides.flush_bytes {
            settings.flush_bytes = bytes;
        }
        if let Some(secs) = overrides.flush_interval_secs {
            settings.flush_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = overrides.retry_limit {
            settings.retry_limit = limit;
        }
        if let Some(max) = overrides.max_pending_chunks {
            settings.max_pending_chunks = max;
        }
        settings
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(config_err("storage_path", "must not be empty"));
        }
        if self.flush_bytes == 0 {
            return Err(config_err("flush_bytes", "must be greater than 0"));
        }
        if self.flush_interval.is_zero() || self.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(config_err(
                "flush_interval",
                format!("must be between 1ms and {}s", MAX_FLUSH_INTERVAL.as_secs()),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(config_err("backoff_base", "must not exceed backoff_max"));
        }
        if self.max_pending_chunks == 0 {
            return Err(config_err("max_pending_chunks", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 라우팅 엔진 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 레이블 정의 YAML 디렉토리
    pub pipeline_dir: PathBuf,
    /// 재라우팅 최대 홉 수
    pub max_hops: u32,
    /// 매칭 실패 시 사용할 레이블
    pub default_label: Option<String>,
    /// 페이로드 최대 크기 (바이트)
    pub max_payload_bytes: usize,
    /// 출력별 수집 채널 용량
    pub intake_channel_capacity: usize,
    /// 백프레셔 모드
    pub backpressure: BackpressureMode,
    /// 출력 버퍼 기본 설정
    pub sink: SinkSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipeline_dir: PathBuf::from("/etc/logroute/conf.d"),
            max_hops: 8,
            default_label: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            intake_channel_capacity: 1024,
            backpressure: BackpressureMode::Block,
            sink: SinkSettings::default(),
        }
    }
}

impl EngineConfig {
    /// core 설정의 `[router]`/`[buffer]` 섹션에서 엔진 설정을 생성합니다.
    ///
    /// 알 수 없는 백프레셔 모드는 core 검증에서 걸러지므로 여기서는 기본값으로 대체합니다.
    pub fn from_core(core: &LogrouteConfig) -> Self {
        let router = &core.router;
        let buffer = &core.buffer;
        Self {
            pipeline_dir: PathBuf::from(&router.pipeline_dir),
            max_hops: router.max_hops,
            default_label: if router.default_label.is_empty() {
                None
            } else {
                Some(router.default_label.clone())
            },
            max_payload_bytes: router.max_payload_bytes,
            intake_channel_capacity: router.intake_channel_capacity,
            backpressure: router.backpressure.parse().unwrap_or_default(),
            sink: SinkSettings {
                storage_path: PathBuf::from(&buffer.storage_path),
                flush_bytes: buffer.flush_bytes,
                flush_interval: Duration::from_secs(buffer.flush_interval_secs),
                retry_limit: buffer.retry_limit,
                backoff_base: Duration::from_millis(buffer.retry_backoff_base_ms),
                backoff_max: Duration::from_millis(buffer.retry_backoff_max_ms),
                max_pending_chunks: buffer.max_pending_chunks,
                shutdown_grace: Duration::from_secs(buffer.shutdown_grace_secs),
            },
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_hops == 0 || self.max_hops > MAX_HOPS_UPPER {
            return Err(config_err(
                "max_hops",
                format!("must be 1-{MAX_HOPS_UPPER}"),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(config_err("max_payload_bytes", "must be greater than 0"));
        }
        if self.intake_channel_capacity == 0 {
            return Err(config_err(
                "intake_channel_capacity",
                "must be greater than 0",
            ));
        }
        if let Some(label) = &self.default_label {
            if label.trim().is_empty() {
                return Err(config_err("default_label", "must not be blank"));
            }
        }
        self.sink.validate()
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> EngineError {
    EngineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 엔진 설정 빌더
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 레이블 정의 디렉토리를 설정합니다.
    pub fn pipeline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pipeline_dir = dir.into();
        self
    }

    /// 최대 홉 수를 설정합니다.
    pub fn max_hops(mut self, hops: u32) -> Self {
        self.config.max_hops = hops;
        self
    }

    /// 기본 레이블을 설정합니다.
    pub fn default_label(mut self, label: impl Into<String>) -> Self {
        self.config.default_label = Some(label.into());
        self
    }

    /// 페이로드 최대 크기를 설정합니다.
    pub fn max_payload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_payload_bytes = bytes;
        self
    }

    /// 수집 채널 용량을 설정합니다.
    pub fn intake_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.intake_channel_capacity = capacity;
        self
    }

    /// 백프레셔 모드를 설정합니다.
    pub fn backpressure(mut self, mode: BackpressureMode) -> Self {
        self.config.backpressure = mode;
        self
    }

    /// 청크 저장 경로를 설정합니다.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sink.storage_path = path.into();
        self
    }

    /// 청크 크기 임계값을 설정합니다.
    pub fn flush_bytes(mut self, bytes: usize) -> Self {
        self.config.sink.flush_bytes = bytes;
        self
    }

    /// 청크 최대 보관 시간을 설정합니다.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.sink.flush_interval = interval;
        self
    }

    /// 재시도 횟수를 설정합니다.
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.sink.retry_limit = limit;
        self
    }

    /// 재시도 백오프 범위를 설정합니다.
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.sink.backoff_base = base;
        self.config.sink.backoff_max = max;
        self
    }

    /// 승인 대기 청크 최대 개수를 설정합니다.
    pub fn max_pending_chunks(mut self, max: usize) -> Self {
        self.config.sink.max_pending_chunks = max;
        self
    }

    /// 종료 유예 시간을 설정합니다.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.sink.shutdown_grace = grace;
        self
    }

    /// 설정을 빌드합니다. 유효성 검증을 수행합니다.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
