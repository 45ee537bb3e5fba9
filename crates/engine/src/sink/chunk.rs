//! 청크 -- 플러시 사이에 누적된 레코드 묶음과 상태 기계
//!
//! ```text
//!  Open ──► Flushing ──► PendingAck ──► Acked
//!   │          │  ▲           │
//!   │          ▼  │ retry     ▼
//!   │        Failed ◄─────────┘
//!   │          │
//!   └──────────┴──► Quarantined (재시도 소진 / 종료 유예 초과)
//! ```
//!
//! 청크는 크기 임계값 이상이거나 보관 시간이 플러시 간격 이상이면 봉인됩니다.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use logroute_core::types::Record;

use crate::error::EngineError;

/// 청크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// 레코드 수신 중
    Open,
    /// 외부 스토리지로 전송 중
    Flushing,
    /// 전송 완료, 응답 대기
    PendingAck,
    /// 승인 완료 (파일 삭제됨)
    Acked,
    /// 전송 실패 (재시도 대기)
    Failed,
    /// 격리됨
    Quarantined,
}

impl ChunkState {
    /// 상태 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Flushing => "flushing",
            Self::PendingAck => "pending_ack",
            Self::Acked => "acked",
            Self::Failed => "failed",
            Self::Quarantined => "quarantined",
        }
    }

    /// `self → next` 전이가 허용되는지 확인합니다.
    pub fn can_transition_to(self, next: ChunkState) -> bool {
        use ChunkState::*;
        matches!(
            (self, next),
            (Open, Flushing)
                | (Open, Quarantined)
                | (Flushing, PendingAck)
                | (Flushing, Failed)
                | (Flushing, Quarantined)
                | (PendingAck, Acked)
                | (PendingAck, Failed)
                | (PendingAck, Quarantined)
                | (Failed, Flushing)
                | (Failed, Quarantined)
        )
    }

    /// 종착 상태 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acked | Self::Quarantined)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 레코드 청크
#[derive(Debug)]
pub struct Chunk {
    /// 청크 ID (파일 이름의 UUID 부분)
    pub id: String,
    /// 출력 내 순번 (파일 이름 정렬 기준)
    pub seq: u64,
    /// 누적 레코드 (도착 순서)
    pub records: Vec<Record>,
    /// NDJSON 직렬화 크기 합계 (줄바꿈 포함)
    pub size_bytes: usize,
    /// 생성 시각
    pub created_at: Instant,
    /// 전송 시도 횟수
    pub attempts: u32,
    /// 저장 파일 경로
    pub path: PathBuf,
    state: ChunkState,
}

impl Chunk {
    /// 새 open 청크를 생성합니다.
    pub fn new(id: String, seq: u64, path: PathBuf) -> Self {
        Self {
            id,
            seq,
            records: Vec::new(),
            size_bytes: 0,
            created_at: Instant::now(),
            attempts: 0,
            path,
            state: ChunkState::Open,
        }
    }

    /// 복구된 청크를 생성합니다 (봉인 상태로 취급하여 바로 전송 대기).
    pub fn recovered(id: String, seq: u64, path: PathBuf, records: Vec<Record>, size_bytes: usize) -> Self {
        Self {
            id,
            seq,
            records,
            size_bytes,
            created_at: Instant::now(),
            attempts: 0,
            path,
            state: ChunkState::Open,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// 상태를 전이합니다.
    pub fn transition(&mut self, next: ChunkState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::ChunkTransition {
                chunk_id: self.id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// 레코드를 추가합니다. `line_len`은 직렬화된 줄 길이(줄바꿈 제외)입니다.
    pub fn push(&mut self, record: Record, line_len: usize) {
        self.records.push(record);
        self.size_bytes += line_len + 1;
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 크기 임계값 도달 여부 (정확히 같으면 도달)
    pub fn is_full(&self, flush_bytes: usize) -> bool {
        self.size_bytes >= flush_bytes
    }

    /// 시간 임계값 도달 여부
    pub fn is_expired(&self, flush_interval: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= flush_interval
    }

    /// 시간 트리거 기한
    pub fn deadline(&self, flush_interval: Duration) -> Instant {
        self.created_at + flush_interval
    }
}
