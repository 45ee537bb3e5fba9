//! 파이프라인 trait — 생명주기 확장 포인트 정의
//!
//! 라우팅 엔진과 출력 워커는 [`Pipeline`] trait을 구현하여
//! 데몬에서 동일한 방식으로 시작/정지/헬스 체크됩니다.

use std::future::Future;
use std::pin::Pin;

use crate::error::LogrouteError;

/// `Send` 가능한 boxed future
///
/// RPITIT trait은 dyn-compatible하지 않으므로, 동적 디스패치가 필요한
/// 곳에서는 이 타입을 반환합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하 (예: 출력 재시도 중)
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }

    /// 두 상태 중 더 나쁜 쪽을 반환합니다.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        match (&self, &other) {
            (Self::Unhealthy(_), _) => self,
            (_, Self::Unhealthy(_)) => other,
            (Self::Degraded(_), _) => self,
            (_, Self::Degraded(_)) => other,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 시작/정지 가능한 파이프라인 컴포넌트
///
/// # 생명주기
/// ```text
/// Built → start() → Running → stop() → Stopped
/// ```
///
/// `start()`를 두 번 호출하면 `PipelineError::AlreadyRunning`,
/// 실행 중이 아닐 때 `stop()`을 호출하면 `PipelineError::NotRunning`을 반환합니다.
pub trait Pipeline: Send {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogrouteError>> + Send;

    /// 컴포넌트를 정지합니다. 버퍼에 남은 데이터를 처리한 뒤 반환합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogrouteError>> + Send;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 파이프라인 trait
///
/// [`Pipeline`]은 RPITIT를 사용하므로 `dyn Pipeline`이 불가합니다.
/// `DynPipeline`은 [`BoxFuture`]를 반환하여 `Box<dyn DynPipeline>`으로
/// 컴포넌트를 동적 관리할 수 있게 합니다.
pub trait DynPipeline: Send {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogrouteError>>;

    /// 컴포넌트를 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogrouteError>>;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

/// Pipeline을 구현한 타입은 자동으로 DynPipeline도 구현됩니다.
impl<T: Pipeline + Sync> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogrouteError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogrouteError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
