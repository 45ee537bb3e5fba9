//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진과 싱크 워커는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logroute_`
//! - 영역: `router_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logroute_core::metrics::ROUTER_RECORDS_INGESTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 드롭/격리 사유 레이블 키 (filtered_out, no_route, hop_limit, ...)
pub const LABEL_REASON: &str = "reason";

/// 라우팅 레이블 이름 레이블 키
pub const LABEL_LABEL: &str = "label";

/// 출력 이름 레이블 키
pub const LABEL_OUTPUT: &str = "output";

// ─── Router 메트릭 ───────────────────────────────────────────────

/// Router: 수집된 레코드 수 (counter)
pub const ROUTER_RECORDS_INGESTED_TOTAL: &str = "logroute_router_records_ingested_total";

/// Router: 구조화 레코드로 해석되지 않은 페이로드 수 (counter)
pub const ROUTER_PAYLOADS_MALFORMED_TOTAL: &str = "logroute_router_payloads_malformed_total";

/// Router: 출력 버퍼로 전달된 레코드 수 (counter, label: label)
pub const ROUTER_RECORDS_ROUTED_TOTAL: &str = "logroute_router_records_routed_total";

/// Router: 드롭된 레코드 수 (counter, label: reason)
pub const ROUTER_RECORDS_DROPPED_TOTAL: &str = "logroute_router_records_dropped_total";

/// Router: 백프레셔로 거부된 레코드 수 (counter)
pub const ROUTER_RECORDS_REJECTED_TOTAL: &str = "logroute_router_records_rejected_total";

/// Router: 레코드 한 건 라우팅 소요 시간 (histogram, 초)
pub const ROUTER_ROUTE_DURATION_SECONDS: &str = "logroute_router_route_duration_seconds";

// ─── Sink 메트릭 ─────────────────────────────────────────────────

/// Sink: 외부 스토리지가 승인한 레코드 수 (counter, label: output)
pub const SINK_RECORDS_ACKED_TOTAL: &str = "logroute_sink_records_acked_total";

/// Sink: 봉인된 청크 수 (counter, label: output)
pub const SINK_CHUNKS_SEALED_TOTAL: &str = "logroute_sink_chunks_sealed_total";

/// Sink: 승인(ack) 완료된 청크 수 (counter, label: output)
pub const SINK_CHUNKS_FLUSHED_TOTAL: &str = "logroute_sink_chunks_flushed_total";

/// Sink: 전송 재시도 수 (counter, label: output)
pub const SINK_RETRIES_TOTAL: &str = "logroute_sink_retries_total";

/// Sink: 격리된 청크 수 (counter, labels: output, reason)
pub const SINK_CHUNKS_QUARANTINED_TOTAL: &str = "logroute_sink_chunks_quarantined_total";

/// Sink: 전송 대기 중인 청크 수 (gauge, label: output)
pub const SINK_PENDING_CHUNKS: &str = "logroute_sink_pending_chunks";

/// Sink: 배치 한 건 전송 소요 시간 (histogram, 초)
pub const SINK_FLUSH_DURATION_SECONDS: &str = "logroute_sink_flush_duration_seconds";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logroute_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logroute_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 라우팅 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 100ms 범위, 레코드 단위 분포
pub const ROUTE_DURATION_BUCKETS: [f64; 8] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1];

/// 배치 전송 시간 히스토그램 버킷 (초)
pub const FLUSH_DURATION_BUCKETS: [f64; 9] = [0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `logroute-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Router
    describe_counter!(
        ROUTER_RECORDS_INGESTED_TOTAL,
        "Total number of records accepted at ingest"
    );
    describe_counter!(
        ROUTER_PAYLOADS_MALFORMED_TOTAL,
        "Total number of payloads that were not a structured JSON object"
    );
    describe_counter!(
        ROUTER_RECORDS_ROUTED_TOTAL,
        "Total number of records handed to an output buffer"
    );
    describe_counter!(
        ROUTER_RECORDS_DROPPED_TOTAL,
        "Total number of records dropped during routing, by reason"
    );
    describe_counter!(
        ROUTER_RECORDS_REJECTED_TOTAL,
        "Total number of records rejected by intake backpressure"
    );
    describe_histogram!(
        ROUTER_ROUTE_DURATION_SECONDS,
        "Time to route a single record in seconds"
    );

    // Sink
    describe_counter!(
        SINK_RECORDS_ACKED_TOTAL,
        "Total number of records acknowledged by the external store"
    );
    describe_counter!(SINK_CHUNKS_SEALED_TOTAL, "Total number of sealed chunks");
    describe_counter!(
        SINK_CHUNKS_FLUSHED_TOTAL,
        "Total number of chunks acknowledged by the external store"
    );
    describe_counter!(SINK_RETRIES_TOTAL, "Total number of delivery retries");
    describe_counter!(
        SINK_CHUNKS_QUARANTINED_TOTAL,
        "Total number of chunks moved to quarantine"
    );
    describe_gauge!(
        SINK_PENDING_CHUNKS,
        "Number of chunks waiting for delivery or acknowledgement"
    );
    describe_histogram!(
        SINK_FLUSH_DURATION_SECONDS,
        "Time to deliver a single batch in seconds"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "logroute daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
