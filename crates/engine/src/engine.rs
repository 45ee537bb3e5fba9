//! 라우팅 엔진 -- 디코딩/라우팅/출력 워커의 전체 흐름을 관리합니다.
//!
//! [`RouterEngine`]은 core의 [`Pipeline`](logroute_core::pipeline::Pipeline) trait을 구현하여
//! `logroute-daemon`에서 시작/정지/헬스 체크됩니다. 레코드 투입은
//! 시작 후 얻는 [`EngineHandle`]로 하며, 여러 생산자 태스크가 동시에 사용할 수 있습니다.
//!
//! # 내부 아키텍처
//! ```text
//! producers ─► EngineHandle::ingest ─► PayloadDecoder ─► Router (stages, reroute)
//!                                                          │
//!                              ┌───────────────────────────┘ Delivered{output}
//!                              ▼
//!                    SinkHandle(output) ─► SinkWorker(output) ─► BulkSink
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logroute_core::error::{LogrouteError, PipelineError};
use logroute_core::metrics as m;
use logroute_core::pipeline::{HealthStatus, Pipeline};
use logroute_core::types::Record;

use crate::config::EngineConfig;
use crate::decode::{PayloadDecoder, PayloadKind};
use crate::error::EngineError;
use crate::label::{LabelGraph, OutputDef, OutputType, PipelineFile, PipelineLoader};
use crate::router::{DropReason, RouteOutcome, Router};
use crate::sink::{
    DynBulkSink, IntakeError, MemorySink, OpenSearchSink, ShutdownReport, SinkHandle,
    SinkStatsSnapshot, SinkWorker, StdoutSink,
};

/// 엔진 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Initialized,
    Running,
    Stopped,
}

/// 레코드 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 출력 버퍼에 기록됨
    Delivered {
        /// 마지막 레이블 이름
        label: String,
        /// 출력 이름
        output: String,
    },
    /// 라우팅 중 드롭됨
    Dropped {
        /// 드롭 사유
        reason: DropReason,
    },
    /// 출력 intake가 거부함
    Rejected {
        /// 출력 이름
        output: String,
        /// 거부 사유
        reason: IntakeError,
    },
}

impl IngestOutcome {
    /// 출력 버퍼에 기록되었는지 여부
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    ingested: AtomicU64,
    malformed: AtomicU64,
    delivered: AtomicU64,
    filtered_out: AtomicU64,
    no_route: AtomicU64,
    hop_limit: AtomicU64,
    no_output: AtomicU64,
    rejected: AtomicU64,
}

impl EngineCounters {
    fn dropped(&self, reason: DropReason) -> &AtomicU64 {
        match reason {
            DropReason::FilteredOut => &self.filtered_out,
            DropReason::NoRoute => &self.no_route,
            DropReason::HopLimit => &self.hop_limit,
            DropReason::NoOutput => &self.no_output,
        }
    }
}

/// 엔진 카운터 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// 투입된 레코드 수
    pub ingested: u64,
    /// 잘못된 형식의 페이로드 수 (레코드는 계속 처리됨)
    pub malformed: u64,
    /// 출력 버퍼에 기록된 레코드 수
    pub delivered: u64,
    /// 필터로 드롭된 레코드 수
    pub filtered_out: u64,
    /// 라우팅 대상이 없어 드롭된 레코드 수
    pub no_route: u64,
    /// 홉 제한으로 드롭된 레코드 수
    pub hop_limit: u64,
    /// 출력 없는 레이블에서 드롭된 레코드 수
    pub no_output: u64,
    /// intake가 거부한 레코드 수
    pub rejected: u64,
    /// 출력별 워커 카운터 (출력 선언 순서)
    pub outputs: Vec<(String, SinkStatsSnapshot)>,
}

impl EngineStats {
    /// 드롭된 레코드 합계
    pub fn dropped(&self) -> u64 {
        self.filtered_out + self.no_route + self.hop_limit + self.no_output
    }
}

struct HandleInner {
    router: Router,
    decoder: PayloadDecoder,
    outputs: Vec<SinkHandle>,
    counters: Arc<EngineCounters>,
}

/// 동시 레코드 투입 API (clone 비용이 작음)
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<HandleInner>,
}

impl EngineHandle {
    /// 원시 페이로드를 디코딩하여 라우팅합니다.
    ///
    /// 잘못된 형식의 페이로드도 레코드로 만들어 계속 처리합니다.
    pub async fn ingest(&self, tag: &str, payload: &[u8]) -> IngestOutcome {
        let decoded = self.inner.decoder.decode(tag, payload);
        if decoded.kind.is_malformed() {
            self.inner.counters.malformed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::ROUTER_PAYLOADS_MALFORMED_TOTAL, m::LABEL_REASON => payload_kind_name(decoded.kind))
                .increment(1);
        }
        self.ingest_record(decoded.record).await
    }

    /// 이미 구성된 레코드를 라우팅합니다.
    pub async fn ingest_record(&self, record: Record) -> IngestOutcome {
        let inner = &self.inner;
        inner.counters.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::ROUTER_RECORDS_INGESTED_TOTAL).increment(1);

        let started = std::time::Instant::now();
        let outcome = inner.router.route(record);
        metrics::histogram!(m::ROUTER_ROUTE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match outcome {
            RouteOutcome::Delivered {
                label,
                output,
                record,
                ..
            } => {
                let label = inner.router.graph().label_name(label).to_owned();
                let Some(sink) = inner.outputs.get(output.0) else {
                    inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    return IngestOutcome::Rejected {
                        output: inner.router.graph().output(output).name.clone(),
                        reason: IntakeError::Closed,
                    };
                };

                match sink.submit(record).await {
                    Ok(()) => {
                        inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(
                            m::ROUTER_RECORDS_ROUTED_TOTAL,
                            m::LABEL_LABEL => label.clone(),
                            m::LABEL_OUTPUT => sink.output().to_owned()
                        )
                        .increment(1);
                        IngestOutcome::Delivered {
                            label,
                            output: sink.output().to_owned(),
                        }
                    }
                    Err(reason) => {
                        inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(m::ROUTER_RECORDS_REJECTED_TOTAL, m::LABEL_OUTPUT => sink.output().to_owned())
                            .increment(1);
                        tracing::debug!(output = sink.output(), reason = %reason, "record rejected by output intake");
                        IngestOutcome::Rejected {
                            output: sink.output().to_owned(),
                            reason,
                        }
                    }
                }
            }
            RouteOutcome::Dropped { reason, .. } => {
                inner.counters.dropped(reason).fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::ROUTER_RECORDS_DROPPED_TOTAL, m::LABEL_REASON => reason.as_str())
                    .increment(1);
                IngestOutcome::Dropped { reason }
            }
        }
    }
}

fn payload_kind_name(kind: PayloadKind) -> &'static str {
    match kind {
        PayloadKind::Object => "object",
        PayloadKind::Text => "text",
        PayloadKind::Invalid => "invalid_utf8",
        PayloadKind::Empty => "empty",
        PayloadKind::Oversize => "oversize",
    }
}

/// 태그 라우팅 엔진
///
/// # 사용 예시
/// ```ignore
/// use logroute_core::pipeline::Pipeline;
/// use logroute_engine::RouterEngineBuilder;
///
/// let mut engine = RouterEngineBuilder::new().config(config).build().await?;
/// engine.start().await?;
/// let handle = engine.handle().expect("running");
/// handle.ingest("order.app", br#"{"log":"[ORDER] created id=42"}"#).await;
/// engine.stop().await?;
/// ```
pub struct RouterEngine {
    config: EngineConfig,
    state: EngineState,
    graph: Arc<LabelGraph>,
    sinks: Vec<Arc<dyn DynBulkSink>>,
    memory_sinks: HashMap<String, MemorySink>,
    counters: Arc<EngineCounters>,
    handle: Option<EngineHandle>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<ShutdownReport>>,
    output_handles: Vec<SinkHandle>,
    last_reports: Vec<ShutdownReport>,
}

impl RouterEngine {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }

    /// 레코드 투입 핸들 (실행 중일 때만)
    pub fn handle(&self) -> Option<EngineHandle> {
        self.handle.clone()
    }

    /// 컴파일된 레이블 그래프
    pub fn graph(&self) -> &LabelGraph {
        &self.graph
    }

    /// 엔진 설정
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `memory` 타입 출력의 저장소
    pub fn memory_sink(&self, output: &str) -> Option<MemorySink> {
        self.memory_sinks.get(output).cloned()
    }

    /// 마지막 `stop()`의 출력별 종료 보고
    pub fn last_shutdown_reports(&self) -> &[ShutdownReport] {
        &self.last_reports
    }

    /// 카운터 스냅샷
    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            ingested: c.ingested.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            filtered_out: c.filtered_out.load(Ordering::Relaxed),
            no_route: c.no_route.load(Ordering::Relaxed),
            hop_limit: c.hop_limit.load(Ordering::Relaxed),
            no_output: c.no_output.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            outputs: self
                .output_handles
                .iter()
                .map(|h| (h.output().to_owned(), h.stats().snapshot()))
                .collect(),
        }
    }

    async fn spawn_workers(&mut self) -> Result<(), EngineError> {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.sinks.len());
        let mut workers = Vec::with_capacity(self.sinks.len());

        for (id, def) in self.graph.outputs() {
            let settings = self.config.sink.with_overrides(&def.buffer);
            settings.validate().map_err(|e| EngineError::Output {
                output: def.name.clone(),
                reason: format!("invalid buffer settings: {e}"),
            })?;

            let sink = Arc::clone(&self.sinks[id.0]);
            let (worker, handle) = match SinkWorker::new(
                &def.name,
                sink,
                settings,
                self.config.intake_channel_capacity,
                self.config.backpressure,
            )
            .await
            {
                Ok(pair) => pair,
                Err(e) => {
                    // 이미 시작한 워커 정리
                    cancel.cancel();
                    for task in workers {
                        join_worker(task).await;
                    }
                    return Err(e);
                }
            };
            workers.push(tokio::spawn(worker.run(cancel.child_token())));
            handles.push(handle);
        }

        self.cancel = cancel;
        self.workers = workers;
        self.output_handles = handles.clone();
        self.handle = Some(EngineHandle {
            inner: Arc::new(HandleInner {
                router: Router::new(Arc::clone(&self.graph), self.config.max_hops),
                decoder: PayloadDecoder::new(self.config.max_payload_bytes),
                outputs: handles,
                counters: Arc::clone(&self.counters),
            }),
        });
        Ok(())
    }
}

/// 워커 태스크 종료 대기 (패닉은 로그로만 남김)
async fn join_worker(task: JoinHandle<ShutdownReport>) -> Option<ShutdownReport> {
    match task.await {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::error!(error = %e, "sink worker task failed");
            None
        }
    }
}

impl Pipeline for RouterEngine {
    async fn start(&mut self) -> Result<(), LogrouteError> {
        if self.state == EngineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(
            labels = self.graph.label_count(),
            outputs = self.sinks.len(),
            "starting router engine"
        );
        self.spawn_workers().await.map_err(LogrouteError::from)?;

        self.state = EngineState::Running;
        tracing::info!("router engine started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogrouteError> {
        if self.state != EngineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping router engine");

        // 1. 새 투입 차단 (이후 ingest는 Rejected{Closed})
        self.handle = None;

        // 2. 워커 취소 및 종료 대기
        self.cancel.cancel();
        let mut reports = Vec::with_capacity(self.workers.len());
        for task in self.workers.drain(..) {
            if let Some(report) = join_worker(task).await {
                reports.push(report);
            }
        }

        let quarantined: usize = reports.iter().map(|r| r.quarantined_chunks).sum();
        let flushed: usize = reports.iter().map(|r| r.flushed_chunks).sum();
        if quarantined > 0 {
            tracing::error!(
                quarantined_chunks = quarantined,
                "router engine stopped with quarantined chunks"
            );
        }
        tracing::info!(flushed_chunks = flushed, "router engine stopped");

        self.last_reports = reports;
        self.state = EngineState::Stopped;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            EngineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            EngineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
            EngineState::Running => {
                let mut status = HealthStatus::Healthy;
                for handle in &self.output_handles {
                    let stats = handle.stats();
                    let limit = self
                        .graph
                        .outputs()
                        .find(|(_, def)| def.name == handle.output())
                        .map(|(_, def)| self.config.sink.with_overrides(&def.buffer).max_pending_chunks)
                        .unwrap_or(self.config.sink.max_pending_chunks);

                    if stats.pending_chunks() >= limit {
                        status = status.worst(HealthStatus::Degraded(format!(
                            "output '{}' has {} pending chunks (limit {limit})",
                            handle.output(),
                            stats.pending_chunks()
                        )));
                    }
                    if stats.chunks_quarantined() > 0 {
                        status = status.worst(HealthStatus::Degraded(format!(
                            "output '{}' quarantined {} chunks",
                            handle.output(),
                            stats.chunks_quarantined()
                        )));
                    }
                }
                status
            }
        }
    }
}

/// 라우팅 엔진 빌더
///
/// 정의를 직접 주지 않으면 `config.pipeline_dir`에서 읽습니다.
pub struct RouterEngineBuilder {
    config: EngineConfig,
    pipeline: Option<PipelineFile>,
    sink_overrides: HashMap<String, Arc<dyn DynBulkSink>>,
}

impl RouterEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            pipeline: None,
            sink_overrides: HashMap::new(),
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 레이블 정의를 직접 지정합니다.
    pub fn pipeline(mut self, pipeline: PipelineFile) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// 출력 구현을 교체합니다 (정의의 `type` 대신 사용).
    pub fn sink(mut self, output: impl Into<String>, sink: Arc<dyn DynBulkSink>) -> Self {
        self.sink_overrides.insert(output.into(), sink);
        self
    }

    /// 엔진을 빌드합니다. 정의 로드와 컴파일 에러는 모두 여기서 반환됩니다.
    pub async fn build(mut self) -> Result<RouterEngine, EngineError> {
        self.config.validate()?;

        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => PipelineLoader::load_directory(&self.config.pipeline_dir).await?,
        };

        let graph = LabelGraph::compile(&pipeline, self.config.default_label.as_deref())?;

        let mut sinks: Vec<Arc<dyn DynBulkSink>> = Vec::new();
        let mut memory_sinks = HashMap::new();
        for (_, def) in graph.outputs() {
            let sink = match self.sink_overrides.remove(&def.name) {
                Some(sink) => sink,
                None => create_sink(def, &mut memory_sinks)?,
            };
            sinks.push(sink);
        }

        if let Some(unknown) = self.sink_overrides.keys().next() {
            return Err(EngineError::Output {
                output: unknown.clone(),
                reason: "sink override for undefined output".to_owned(),
            });
        }

        tracing::debug!(
            labels = graph.label_count(),
            outputs = sinks.len(),
            "router engine built"
        );

        Ok(RouterEngine {
            config: self.config,
            state: EngineState::Initialized,
            graph: Arc::new(graph),
            sinks,
            memory_sinks,
            counters: Arc::new(EngineCounters::default()),
            handle: None,
            cancel: CancellationToken::new(),
            workers: Vec::new(),
            output_handles: Vec::new(),
            last_reports: Vec::new(),
        })
    }
}

impl Default for RouterEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn create_sink(
    def: &OutputDef,
    memory_sinks: &mut HashMap<String, MemorySink>,
) -> Result<Arc<dyn DynBulkSink>, EngineError> {
    match def.output_type {
        OutputType::Opensearch => {
            let spec = def.opensearch.as_ref().ok_or_else(|| EngineError::Output {
                output: def.name.clone(),
                reason: "type opensearch requires an 'opensearch' section".to_owned(),
            })?;
            Ok(Arc::new(OpenSearchSink::new(spec)?))
        }
        OutputType::Stdout => Ok(Arc::new(StdoutSink::new())),
        OutputType::Memory => {
            let sink = MemorySink::new();
            memory_sinks.insert(def.name.clone(), sink.clone());
            Ok(Arc::new(sink))
        }
    }
}
