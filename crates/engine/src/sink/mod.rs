//! 버퍼 싱크 -- 청크 단위 내구성 버퍼링과 외부 스토리지 전송
//!
//! 출력 하나당 워커 태스크 하나가 청크를 소유합니다 (단일 작성자).
//!
//! ```text
//!  intake (mpsc) ──► SinkWorker ──► open chunk ──seal──► pending queue
//!                        │            (fsync)               │
//!                        │                                  ▼ (한 번에 하나)
//!                        │◄──── ack/fail ────── delivery task ──► BulkSink
//!                        │                        (retry + backoff)
//!                        ▼
//!                   ChunkStore (<storage>/<output>/*.open|*.sealed)
//! ```
//!
//! # 아키텍처
//! - [`chunk`]: 청크와 상태 전이
//! - [`store`]: 파일 기반 청크 저장소, 복구, 격리(quarantine)
//! - [`retry`]: 지수 백오프 재시도 정책
//! - [`worker`]: 출력별 싱크 워커 태스크
//! - [`opensearch`], [`stdout`], [`memory`]: [`BulkSink`] 구현

pub mod chunk;
pub mod memory;
pub mod opensearch;
pub mod retry;
pub mod stdout;
pub mod store;
pub mod worker;

pub use chunk::{Chunk, ChunkState};
pub use memory::MemorySink;
pub use opensearch::OpenSearchSink;
pub use retry::RetryPolicy;
pub use stdout::StdoutSink;
pub use store::{ChunkStore, QuarantineMeta, list_quarantined};
pub use worker::{IntakeError, ShutdownReport, SinkHandle, SinkStats, SinkStatsSnapshot, SinkWorker};

use std::future::Future;

use logroute_core::error::SinkError;
use logroute_core::pipeline::BoxFuture;
use logroute_core::types::Record;

/// 배치 전송 결과
///
/// 배치 전체 실패는 `Err(SinkError)`로 표현합니다. `Ok`는 배치가 처리되었음을 뜻하며,
/// 개별 레코드 실패는 인덱스로 보고됩니다. 나열되지 않은 레코드는 승인된 것입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// 재시도해야 할 레코드 인덱스
    pub retry: Vec<usize>,
    /// 영구 거부된 레코드 인덱스와 사유
    pub rejected: Vec<(usize, String)>,
}

impl BulkOutcome {
    /// 모든 레코드 승인
    pub fn all_acked() -> Self {
        Self::default()
    }

    /// 승인된 레코드 수
    pub fn acked_count(&self, total: usize) -> usize {
        total.saturating_sub(self.retry.len() + self.rejected.len())
    }

    /// 재시도할 레코드가 없는지 여부
    pub fn is_complete(&self) -> bool {
        self.retry.is_empty()
    }
}

/// 외부 스토리지로 배치를 전송하는 출력
///
/// 같은 레코드(같은 `id`)가 재전송될 수 있으므로 구현체는 가능하면
/// `id`를 중복 제거 키로 사용해야 합니다.
pub trait BulkSink: Send + Sync {
    /// 출력 종류 이름
    fn kind(&self) -> &'static str;

    /// 레코드 배치를 전송합니다.
    fn send_bulk(
        &self,
        records: &[Record],
    ) -> impl Future<Output = Result<BulkOutcome, SinkError>> + Send;
}

/// dyn-compatible 출력 trait
///
/// 워커는 출력 종류를 모른 채 `Arc<dyn DynBulkSink>`로 보관합니다.
pub trait DynBulkSink: Send + Sync {
    /// 출력 종류 이름
    fn kind(&self) -> &'static str;

    /// 레코드 배치를 전송합니다.
    fn send_bulk<'a>(
        &'a self,
        records: &'a [Record],
    ) -> BoxFuture<'a, Result<BulkOutcome, SinkError>>;
}

impl<T: BulkSink> DynBulkSink for T {
    fn kind(&self) -> &'static str {
        BulkSink::kind(self)
    }

    fn send_bulk<'a>(
        &'a self,
        records: &'a [Record],
    ) -> BoxFuture<'a, Result<BulkOutcome, SinkError>> {
        Box::pin(BulkSink::send_bulk(self, records))
    }
}
