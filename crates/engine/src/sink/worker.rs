//! 싱크 워커 -- 출력 하나의 청크를 소유하는 단일 작성자 태스크
//!
//! # 흐름
//! 1. [`SinkHandle::submit`]이 레코드를 intake 채널로 보내고 디스크 동기화 승인을 기다립니다.
//! 2. 워커는 대기 중인 intake를 묶어 open 청크 파일에 한 번에 쓰고 `sync_data` 후 승인합니다.
//! 3. 크기/시간 임계값에 도달한 청크는 봉인되어 전송 대기열로 이동합니다.
//! 4. 전송은 별도 태스크에서 한 번에 하나씩, 봉인 순서대로 진행됩니다.
//!    수집은 전송과 무관하게 다음 청크로 계속됩니다.
//! 5. 승인 대기 청크가 `max_pending_chunks`에 도달하면 intake 수신을 멈춥니다.
//!    채널이 차면 block 모드는 송신자가 대기하고, reject 모드는 즉시 거부됩니다.
//!
//! # 종료
//! 취소되면 intake를 닫고 남은 레코드를 기록한 뒤 open 청크를 봉인합니다.
//! `shutdown_grace` 안에 전송하지 못한 청크는 격리됩니다.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logroute_core::metrics as m;
use logroute_core::types::Record;

use crate::config::{BackpressureMode, SinkSettings};
use crate::error::EngineError;

use super::chunk::{Chunk, ChunkState};
use super::retry::RetryPolicy;
use super::store::{ChunkStore, encode_line};
use super::{BulkOutcome, DynBulkSink};

/// 한 번의 디스크 쓰기로 묶는 최대 intake 수
const INTAKE_BATCH: usize = 256;

/// intake 실패 사유
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// reject 모드에서 채널이 가득 참
    #[error("intake channel is full")]
    Full,
    /// 워커가 종료됨
    #[error("sink worker is closed")]
    Closed,
    /// 버퍼 파일 쓰기 실패
    #[error("buffer write failed: {0}")]
    BufferWrite(String),
}

struct Intake {
    record: Record,
    ack: oneshot::Sender<Result<(), String>>,
}

/// 워커 카운터 (워커와 전송 태스크가 공유)
#[derive(Debug, Default)]
pub struct SinkStats {
    records_buffered: AtomicU64,
    records_acked: AtomicU64,
    records_quarantined: AtomicU64,
    chunks_sealed: AtomicU64,
    chunks_acked: AtomicU64,
    chunks_quarantined: AtomicU64,
    retries: AtomicU64,
    pending_chunks: AtomicUsize,
}

/// [`SinkStats`] 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    /// 디스크에 기록되어 승인된 레코드 수
    pub records_buffered: u64,
    /// 외부 스토리지가 승인한 레코드 수
    pub records_acked: u64,
    /// 격리된 레코드 수
    pub records_quarantined: u64,
    /// 봉인된 청크 수
    pub chunks_sealed: u64,
    /// 전송 완료된 청크 수
    pub chunks_acked: u64,
    /// 격리된 청크 수
    pub chunks_quarantined: u64,
    /// 재시도 횟수
    pub retries: u64,
    /// 현재 승인 대기 청크 수 (전송 중 포함)
    pub pending_chunks: usize,
}

impl SinkStats {
    /// 현재 값을 읽습니다.
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            records_buffered: self.records_buffered.load(Ordering::Relaxed),
            records_acked: self.records_acked.load(Ordering::Relaxed),
            records_quarantined: self.records_quarantined.load(Ordering::Relaxed),
            chunks_sealed: self.chunks_sealed.load(Ordering::Relaxed),
            chunks_acked: self.chunks_acked.load(Ordering::Relaxed),
            chunks_quarantined: self.chunks_quarantined.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            pending_chunks: self.pending_chunks.load(Ordering::Relaxed),
        }
    }

    /// 현재 승인 대기 청크 수
    pub fn pending_chunks(&self) -> usize {
        self.pending_chunks.load(Ordering::Relaxed)
    }

    /// 격리된 청크 수
    pub fn chunks_quarantined(&self) -> u64 {
        self.chunks_quarantined.load(Ordering::Relaxed)
    }
}

/// 워커 종료 보고
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 출력 이름
    pub output: String,
    /// 종료 중 전송 완료된 청크 수
    pub flushed_chunks: usize,
    /// 종료 중 격리된 청크 수
    pub quarantined_chunks: usize,
    /// 종료 중 격리된 레코드 수
    pub quarantined_records: usize,
}

/// 출력 intake 핸들 (clone 가능)
#[derive(Debug, Clone)]
pub struct SinkHandle {
    output: String,
    tx: mpsc::Sender<Intake>,
    backpressure: BackpressureMode,
    stats: Arc<SinkStats>,
}

impl std::fmt::Debug for Intake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intake").field("record", &self.record.id).finish()
    }
}

impl SinkHandle {
    /// 출력 이름
    pub fn output(&self) -> &str {
        &self.output
    }

    /// 워커 카운터
    pub fn stats(&self) -> &Arc<SinkStats> {
        &self.stats
    }

    /// 레코드를 버퍼에 넣고 디스크 동기화까지 기다립니다.
    pub async fn submit(&self, record: Record) -> Result<(), IntakeError> {
        let (ack, ack_rx) = oneshot::channel();
        let intake = Intake { record, ack };

        match self.backpressure {
            BackpressureMode::Block => self
                .tx
                .send(intake)
                .await
                .map_err(|_| IntakeError::Closed)?,
            BackpressureMode::Reject => self.tx.try_send(intake).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => IntakeError::Full,
                mpsc::error::TrySendError::Closed(_) => IntakeError::Closed,
            })?,
        }

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(IntakeError::BufferWrite(reason)),
            Err(_) => Err(IntakeError::Closed),
        }
    }
}

/// 전송 태스크가 공유하는 문맥
#[derive(Clone)]
struct DeliveryContext {
    output: String,
    store: Arc<ChunkStore>,
    sink: Arc<dyn DynBulkSink>,
    policy: RetryPolicy,
    stats: Arc<SinkStats>,
}

/// 진행 중인 전송
struct InFlight {
    handle: JoinHandle<Chunk>,
    chunk_id: String,
    path: PathBuf,
    records: usize,
}

/// 출력별 싱크 워커
pub struct SinkWorker {
    output: String,
    settings: SinkSettings,
    rx: mpsc::Receiver<Intake>,
    ctx: DeliveryContext,
    open: Option<(Chunk, tokio::fs::File)>,
    pending: VecDeque<Chunk>,
}

impl SinkWorker {
    /// 저장소를 열고 남은 청크를 복구한 뒤 워커와 핸들을 생성합니다.
    pub async fn new(
        output: &str,
        sink: Arc<dyn DynBulkSink>,
        settings: SinkSettings,
        channel_capacity: usize,
        backpressure: BackpressureMode,
    ) -> Result<(Self, SinkHandle), EngineError> {
        let store = ChunkStore::open(&settings.storage_path, output).await?;
        let recovered = store.recover().await?;

        let stats = Arc::new(SinkStats::default());
        stats
            .pending_chunks
            .store(recovered.len(), Ordering::Relaxed);

        let (tx, rx) = mpsc::channel(channel_capacity);
        let handle = SinkHandle {
            output: output.to_owned(),
            tx,
            backpressure,
            stats: Arc::clone(&stats),
        };

        let ctx = DeliveryContext {
            output: output.to_owned(),
            store: Arc::new(store),
            sink,
            policy: RetryPolicy::from(&settings),
            stats,
        };

        let worker = Self {
            output: output.to_owned(),
            settings,
            rx,
            ctx,
            open: None,
            pending: recovered.into(),
        };
        Ok((worker, handle))
    }

    /// 워커를 실행합니다. 취소되거나 모든 핸들이 drop되면 종료 절차를 수행합니다.
    pub async fn run(mut self, cancel: CancellationToken) -> ShutdownReport {
        info!(
            output = %self.output,
            sink = self.ctx.sink.kind(),
            recovered = self.pending.len(),
            "sink worker started"
        );

        let mut inflight: Option<InFlight> = None;

        loop {
            if inflight.is_none() {
                if let Some(chunk) = self.pending.pop_front() {
                    inflight = Some(self.dispatch(chunk));
                }
            }
            self.publish_pending(inflight.is_some());

            let accepting = self.pending_count(inflight.is_some()) < self.settings.max_pending_chunks;
            let flush_at = self
                .open
                .as_ref()
                .map(|(chunk, _)| chunk.deadline(self.settings.flush_interval));

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(output = %self.output, "sink worker received shutdown signal");
                    break;
                }

                Some(joined) = async {
                    match inflight.as_mut() {
                        Some(f) => Some((&mut f.handle).await),
                        None => None,
                    }
                } => {
                    if let Some(done) = inflight.take() {
                        self.complete(done, joined);
                    }
                }

                _ = tokio::time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    self.seal_open().await;
                }

                received = self.rx.recv(), if accepting => {
                    match received {
                        Some(first) => {
                            let mut batch = vec![first];
                            while batch.len() < INTAKE_BATCH {
                                match self.rx.try_recv() {
                                    Ok(intake) => batch.push(intake),
                                    Err(_) => break,
                                }
                            }
                            self.write_batch(batch).await;
                        }
                        None => {
                            debug!(output = %self.output, "all sink handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown(inflight).await
    }

    fn pending_count(&self, has_inflight: bool) -> usize {
        self.pending.len() + usize::from(has_inflight)
    }

    fn publish_pending(&self, has_inflight: bool) {
        let pending = self.pending_count(has_inflight);
        self.ctx.stats.pending_chunks.store(pending, Ordering::Relaxed);
        metrics::gauge!(m::SINK_PENDING_CHUNKS, m::LABEL_OUTPUT => self.output.clone())
            .set(pending as f64);
    }

    /// intake 묶음을 open 청크에 기록합니다. 크기 임계값에 도달하면 중간에 봉인합니다.
    async fn write_batch(&mut self, batch: Vec<Intake>) {
        let mut lines = Vec::new();
        let mut staged: Vec<(Intake, usize)> = Vec::new();

        for intake in batch {
            let line = match encode_line(&intake.record) {
                Ok(line) => line,
                Err(e) => {
                    let _ = intake.ack.send(Err(e.to_string()));
                    continue;
                }
            };
            lines.extend_from_slice(&line);
            staged.push((intake, line.len() - 1));

            let open_bytes = self.open.as_ref().map_or(0, |(chunk, _)| chunk.size_bytes);
            if open_bytes + lines.len() >= self.settings.flush_bytes {
                self.commit(std::mem::take(&mut lines), std::mem::take(&mut staged))
                    .await;
            }
        }

        if !staged.is_empty() {
            self.commit(lines, staged).await;
        }
    }

    async fn commit(&mut self, lines: Vec<u8>, staged: Vec<(Intake, usize)>) {
        if let Err(e) = self.append(&lines).await {
            error!(output = %self.output, error = %e, records = staged.len(), "failed to buffer records");
            let reason = e.to_string();
            for (intake, _) in staged {
                let _ = intake.ack.send(Err(reason.clone()));
            }
            // 실패한 파일에는 더 이상 쓰지 않음. 승인된 레코드만 남은 채로 봉인
            self.seal_open().await;
            return;
        }

        let count = staged.len() as u64;
        if let Some((chunk, _)) = self.open.as_mut() {
            for (intake, line_len) in staged {
                chunk.push(intake.record, line_len);
                let _ = intake.ack.send(Ok(()));
            }
        }
        self.ctx
            .stats
            .records_buffered
            .fetch_add(count, Ordering::Relaxed);

        let full = self
            .open
            .as_ref()
            .is_some_and(|(chunk, _)| chunk.is_full(self.settings.flush_bytes));
        if full {
            self.seal_open().await;
        }
    }

    async fn append(&mut self, lines: &[u8]) -> Result<(), EngineError> {
        if self.open.is_none() {
            self.open = Some(self.ctx.store.create_chunk().await?);
        }
        match self.open.as_mut() {
            Some((chunk, file)) => self.ctx.store.append(file, chunk, lines).await,
            None => Ok(()),
        }
    }

    /// open 청크를 봉인하여 전송 대기열에 넣습니다.
    async fn seal_open(&mut self) {
        let Some((mut chunk, file)) = self.open.take() else {
            return;
        };
        drop(file);

        if chunk.is_empty() {
            if let Err(e) = self.ctx.store.remove(&chunk).await {
                warn!(output = %self.output, error = %e, "failed to remove empty chunk");
            }
            return;
        }

        if let Err(e) = self.ctx.store.seal(&mut chunk).await {
            // 파일 이름만 .open으로 남음. 복구 시 동일하게 처리됨
            error!(output = %self.output, chunk_id = %chunk.id, error = %e, "failed to seal chunk");
        }

        debug!(
            output = %self.output,
            chunk_id = %chunk.id,
            records = chunk.len(),
            bytes = chunk.size_bytes,
            "chunk sealed"
        );
        self.ctx.stats.chunks_sealed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SINK_CHUNKS_SEALED_TOTAL, m::LABEL_OUTPUT => self.output.clone())
            .increment(1);
        self.pending.push_back(chunk);
    }

    fn dispatch(&self, chunk: Chunk) -> InFlight {
        let chunk_id = chunk.id.clone();
        let path = chunk.path.clone();
        let records = chunk.len();
        let ctx = self.ctx.clone();
        InFlight {
            handle: tokio::spawn(deliver(chunk, ctx)),
            chunk_id,
            path,
            records,
        }
    }

    fn complete(&self, done: InFlight, joined: Result<Chunk, tokio::task::JoinError>) {
        match joined {
            Ok(chunk) if chunk.state() == ChunkState::Acked => {
                self.ctx.stats.chunks_acked.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(e) => {
                // 파일은 디스크에 남아 재시작 시 복구됨
                error!(
                    output = %self.output,
                    chunk_id = %done.chunk_id,
                    error = %e,
                    "delivery task failed"
                );
            }
        }
    }

    async fn shutdown(mut self, mut inflight: Option<InFlight>) -> ShutdownReport {
        let mut report = ShutdownReport {
            output: self.output.clone(),
            ..ShutdownReport::default()
        };

        // 1. intake 종료 후 남은 레코드 기록
        self.rx.close();
        let mut rest = Vec::new();
        while let Some(intake) = self.rx.recv().await {
            rest.push(intake);
        }
        if !rest.is_empty() {
            self.write_batch(rest).await;
        }

        // 2. open 청크 봉인
        self.seal_open().await;

        // 3. 유예 시간 안에 남은 청크 전송
        let deadline = Instant::now() + self.settings.shutdown_grace;
        loop {
            if inflight.is_none() {
                match self.pending.pop_front() {
                    Some(chunk) => inflight = Some(self.dispatch(chunk)),
                    None => break,
                }
            }
            let Some(current) = inflight.as_mut() else {
                break;
            };

            match tokio::time::timeout_at(deadline, &mut current.handle).await {
                Ok(joined) => {
                    let acked = matches!(&joined, Ok(chunk) if chunk.state() == ChunkState::Acked);
                    if let Some(done) = inflight.take() {
                        self.complete(done, joined);
                    }
                    if acked {
                        report.flushed_chunks += 1;
                    }
                }
                Err(_) => {
                    warn!(
                        output = %self.output,
                        grace_secs = self.settings.shutdown_grace.as_secs_f64(),
                        "shutdown grace period elapsed"
                    );
                    current.handle.abort();
                    // 중단 완료 후에 파일을 옮김
                    let _ = (&mut current.handle).await;
                    break;
                }
            }
        }

        // 4. 남은 청크 격리
        if let Some(current) = inflight.take() {
            self.quarantine_on_shutdown(&current.path, &current.chunk_id, 0, current.records, &mut report)
                .await;
        }
        while let Some(chunk) = self.pending.pop_front() {
            self.quarantine_on_shutdown(&chunk.path, &chunk.id, chunk.attempts, chunk.len(), &mut report)
                .await;
        }
        self.publish_pending(false);

        if report.quarantined_chunks > 0 {
            error!(
                output = %self.output,
                chunks = report.quarantined_chunks,
                records = report.quarantined_records,
                "chunks quarantined at shutdown"
            );
        }
        info!(
            output = %self.output,
            flushed = report.flushed_chunks,
            quarantined = report.quarantined_chunks,
            "sink worker stopped"
        );
        report
    }

    async fn quarantine_on_shutdown(
        &self,
        path: &std::path::Path,
        chunk_id: &str,
        attempts: u32,
        records: usize,
        report: &mut ShutdownReport,
    ) {
        match self
            .ctx
            .store
            .quarantine_file(path, chunk_id, attempts, records, "shutdown grace period elapsed")
            .await
        {
            Ok(_) => {
                report.quarantined_chunks += 1;
                report.quarantined_records += records;
                record_quarantine(&self.ctx, 1, records);
            }
            Err(e) => {
                error!(output = %self.output, chunk_id, error = %e, "failed to quarantine chunk");
            }
        }
    }
}

fn record_quarantine(ctx: &DeliveryContext, chunks: u64, records: usize) {
    ctx.stats
        .chunks_quarantined
        .fetch_add(chunks, Ordering::Relaxed);
    ctx.stats
        .records_quarantined
        .fetch_add(records as u64, Ordering::Relaxed);
    if chunks > 0 {
        metrics::counter!(m::SINK_CHUNKS_QUARANTINED_TOTAL, m::LABEL_OUTPUT => ctx.output.clone())
            .increment(chunks);
    }
}

/// 청크 하나를 승인 또는 격리될 때까지 전송합니다.
async fn deliver(mut chunk: Chunk, ctx: DeliveryContext) -> Chunk {
    let started = Instant::now();

    loop {
        chunk.attempts += 1;
        if let Err(e) = chunk.transition(ChunkState::Flushing) {
            error!(output = %ctx.output, error = %e, "unexpected chunk state");
            return chunk;
        }

        let reason = match ctx.sink.send_bulk(&chunk.records).await {
            Ok(outcome) => {
                let _ = chunk.transition(ChunkState::PendingAck);
                if let Some(reason) = settle(&mut chunk, outcome, &ctx).await {
                    reason
                } else {
                    let _ = chunk.transition(ChunkState::Acked);
                    if let Err(e) = ctx.store.remove(&chunk).await {
                        warn!(output = %ctx.output, chunk_id = %chunk.id, error = %e, "failed to remove acked chunk");
                    }
                    metrics::counter!(m::SINK_CHUNKS_FLUSHED_TOTAL, m::LABEL_OUTPUT => ctx.output.clone())
                        .increment(1);
                    metrics::histogram!(m::SINK_FLUSH_DURATION_SECONDS, m::LABEL_OUTPUT => ctx.output.clone())
                        .record(started.elapsed().as_secs_f64());
                    debug!(
                        output = %ctx.output,
                        chunk_id = %chunk.id,
                        attempts = chunk.attempts,
                        "chunk acknowledged"
                    );
                    return chunk;
                }
            }
            Err(e) => {
                let _ = chunk.transition(ChunkState::Failed);
                format!("{} error: {e}", e.kind())
            }
        };

        if !ctx.policy.should_retry(chunk.attempts) {
            error!(
                output = %ctx.output,
                chunk_id = %chunk.id,
                attempts = chunk.attempts,
                records = chunk.len(),
                reason = %reason,
                "retry limit exhausted, quarantining chunk"
            );
            match ctx.store.quarantine(&chunk, &reason).await {
                Ok(_) => record_quarantine(&ctx, 1, chunk.len()),
                Err(e) => {
                    error!(output = %ctx.output, chunk_id = %chunk.id, error = %e, "failed to quarantine chunk");
                }
            }
            let _ = chunk.transition(ChunkState::Quarantined);
            return chunk;
        }

        let delay = ctx.policy.backoff(chunk.attempts);
        warn!(
            output = %ctx.output,
            chunk_id = %chunk.id,
            attempt = chunk.attempts,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "chunk delivery failed, retrying"
        );
        ctx.stats.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SINK_RETRIES_TOTAL, m::LABEL_OUTPUT => ctx.output.clone()).increment(1);
        tokio::time::sleep(delay).await;
    }
}

/// 항목별 결과를 반영합니다. 재시도할 레코드가 남으면 사유를 반환합니다.
async fn settle(chunk: &mut Chunk, outcome: BulkOutcome, ctx: &DeliveryContext) -> Option<String> {
    let total = chunk.len();
    let acked = outcome.acked_count(total);
    ctx.stats
        .records_acked
        .fetch_add(acked as u64, Ordering::Relaxed);
    metrics::counter!(m::SINK_RECORDS_ACKED_TOTAL, m::LABEL_OUTPUT => ctx.output.clone())
        .increment(acked as u64);

    if outcome.rejected.is_empty() && outcome.is_complete() {
        return None;
    }

    let records = std::mem::take(&mut chunk.records);
    let (retry, rejected) = partition(records, &outcome);

    if !rejected.is_empty() {
        for (reason, records) in group_by_reason(rejected) {
            warn!(
                output = %ctx.output,
                chunk_id = %chunk.id,
                records = records.len(),
                reason = %reason,
                "records rejected by output, quarantining"
            );
            match ctx
                .store
                .quarantine_records(&chunk.id, &records, chunk.attempts, &reason)
                .await
            {
                Ok(_) => record_quarantine(ctx, 0, records.len()),
                Err(e) => {
                    error!(output = %ctx.output, chunk_id = %chunk.id, error = %e, "failed to quarantine rejected records");
                }
            }
        }
    }

    chunk.size_bytes = 0;
    for record in &retry {
        if let Ok(line) = encode_line(record) {
            chunk.size_bytes += line.len();
        }
    }
    chunk.records = retry;

    if chunk.is_empty() {
        return None;
    }

    let _ = chunk.transition(ChunkState::Failed);
    if let Err(e) = ctx.store.rewrite(chunk).await {
        // 원본 파일이 그대로 남아 있으므로 최악의 경우 재전송만 발생
        warn!(output = %ctx.output, chunk_id = %chunk.id, error = %e, "failed to rewrite partially acked chunk");
    }
    Some(format!("{} of {total} records need retry", chunk.len()))
}

/// 레코드를 (재시도, 거부) 두 묶음으로 나눕니다. 나머지는 승인된 것입니다.
fn partition(records: Vec<Record>, outcome: &BulkOutcome) -> (Vec<Record>, Vec<(Record, String)>) {
    let mut retry = Vec::with_capacity(outcome.retry.len());
    let mut rejected = Vec::with_capacity(outcome.rejected.len());
    for (index, record) in records.into_iter().enumerate() {
        if outcome.retry.contains(&index) {
            retry.push(record);
        } else if let Some((_, reason)) = outcome.rejected.iter().find(|(i, _)| *i == index) {
            rejected.push((record, reason.clone()));
        }
    }
    (retry, rejected)
}

/// 거부 사유별로 묶습니다. 사유는 처음 나온 순서, 레코드는 청크 순서를 유지합니다.
fn group_by_reason(rejected: Vec<(Record, String)>) -> Vec<(String, Vec<Record>)> {
    let mut groups: Vec<(String, Vec<Record>)> = Vec::new();
    for (record, reason) in rejected {
        match groups.iter_mut().find(|(r, _)| *r == reason) {
            Some((_, records)) => records.push(record),
            None => groups.push((reason, vec![record])),
        }
    }
    groups
}
