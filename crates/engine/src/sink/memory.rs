//! 메모리 출력 -- 테스트와 로컬 검증용
//!
//! 승인된 레코드를 `id` 기준으로 보관하므로 재전송된 레코드는 한 번만 남습니다.
//! 장애 주입(`fail_next`, `reject_field`, `respond_next`)으로 재시도/격리 경로를
//! 재현할 수 있습니다.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use logroute_core::error::SinkError;
use logroute_core::types::Record;

use super::{BulkOutcome, BulkSink};

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<BTreeMap<String, Record>>,
    fail_next: AtomicU32,
    reject_field: Mutex<Option<String>>,
    scripted: Mutex<VecDeque<BulkOutcome>>,
    batches: Mutex<Vec<Vec<String>>>,
    calls: AtomicU64,
}

/// 메모리 출력 (clone은 같은 저장소를 공유)
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    shared: Arc<Shared>,
}

impl MemorySink {
    /// 빈 메모리 출력을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 `n`번의 전송을 연결 오류로 실패시킵니다.
    pub fn fail_next(&self, n: u32) {
        self.shared.fail_next.store(n, Ordering::SeqCst);
    }

    /// 지정한 필드를 가진 레코드를 영구 거부합니다.
    pub fn reject_field(&self, field: impl Into<String>) {
        if let Ok(mut guard) = self.shared.reject_field.lock() {
            *guard = Some(field.into());
        }
    }

    /// 다음 전송에서 항목별 결과를 그대로 돌려줍니다.
    ///
    /// `retry`/`rejected`에 나열된 인덱스는 저장되지 않습니다. 여러 번 호출하면
    /// 이후 전송에 차례로 적용됩니다.
    pub fn respond_next(&self, outcome: BulkOutcome) {
        if let Ok(mut queue) = self.shared.scripted.lock() {
            queue.push_back(outcome);
        }
    }

    /// 전송된 배치들의 레코드 id (호출 순서, 실패 포함)
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.shared
            .batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// 승인된 레코드 (id 순서)
    pub fn records(&self) -> Vec<Record> {
        self.shared
            .records
            .lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 승인된 레코드 수
    pub fn len(&self) -> usize {
        self.shared.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `send_bulk` 호출 횟수 (실패 포함)
    pub fn calls(&self) -> u64 {
        self.shared.calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.shared
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl BulkSink for MemorySink {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn send_bulk(&self, records: &[Record]) -> Result<BulkOutcome, SinkError> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let poisoned = || SinkError::Protocol("memory sink lock poisoned".to_owned());
        self.shared
            .batches
            .lock()
            .map_err(|_| poisoned())?
            .push(records.iter().map(|r| r.id.clone()).collect());

        if self.take_failure() {
            return Err(SinkError::Connection("injected failure".to_owned()));
        }

        let scripted = self.shared.scripted.lock().map_err(|_| poisoned())?.pop_front();
        if let Some(outcome) = scripted {
            let mut stored = self.shared.records.lock().map_err(|_| poisoned())?;
            for (index, record) in records.iter().enumerate() {
                let failed = outcome.retry.contains(&index)
                    || outcome.rejected.iter().any(|(i, _)| *i == index);
                if !failed {
                    stored.insert(record.id.clone(), record.clone());
                }
            }
            return Ok(outcome);
        }

        let reject_field = self
            .shared
            .reject_field
            .lock()
            .map_err(|_| poisoned())?
            .clone();

        let mut stored = self
            .shared
            .records
            .lock()
            .map_err(|_| poisoned())?;

        let mut outcome = BulkOutcome::all_acked();
        for (index, record) in records.iter().enumerate() {
            if let Some(field) = &reject_field {
                if record.get(field).is_some() {
                    outcome
                        .rejected
                        .push((index, format!("field '{field}' rejected")));
                    continue;
                }
            }
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(outcome)
    }
}
