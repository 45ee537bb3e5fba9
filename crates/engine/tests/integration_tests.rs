//! 통합 테스트 -- 수집부터 출력 승인까지의 전체 흐름 검증
//!
//! `demos/conf.d/` 디렉토리 전체(order-app, user-app, fastapi-app)를 그대로 로드하고,
//! OpenSearch 출력은 메모리 출력으로 교체하여 검증합니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use logroute_core::pipeline::Pipeline;
use logroute_core::types::Record;
use logroute_engine::sink::store::{ChunkStore, encode_line, list_quarantined};
use logroute_engine::{
    BackpressureMode, DropReason, EngineConfig, EngineConfigBuilder, IngestOutcome, IntakeError,
    MemorySink, PipelineLoader, RouterEngine, RouterEngineBuilder,
};

fn demo_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/conf.d")
}

fn config(storage: &Path) -> EngineConfigBuilder {
    EngineConfigBuilder::new()
        .pipeline_dir(demo_dir())
        .storage_path(storage)
        .flush_interval(Duration::from_millis(20))
        .backoff(Duration::from_millis(1), Duration::from_millis(10))
}

const DEMO_OUTPUTS: &[&str] = &[
    "order-app",
    "order-app-errors",
    "user-app",
    "user-app-errors",
    "fastapi-app",
    "fastapi-app-errors",
];

struct Demo {
    engine: RouterEngine,
    sinks: BTreeMap<&'static str, MemorySink>,
}

impl Demo {
    fn sink(&self, output: &str) -> &MemorySink {
        &self.sinks[output]
    }

    /// 레코드 하나가 `output`에 승인될 때까지 기다린 뒤 반환합니다.
    async fn delivered(&self, output: &str) -> Record {
        let sink = self.sink(output);
        wait_for(sink, 1).await;
        sink.records().remove(0)
    }

    /// 지정한 출력 외에는 아무것도 받지 않았는지 확인합니다.
    fn assert_only(&self, output: &str) {
        for (name, sink) in &self.sinks {
            if *name != output {
                assert!(sink.is_empty(), "unexpected records in '{name}'");
            }
        }
    }
}

async fn demo(config: EngineConfig) -> Demo {
    let sinks: BTreeMap<_, _> = DEMO_OUTPUTS
        .iter()
        .map(|name| (*name, MemorySink::new()))
        .collect();
    let mut builder = RouterEngineBuilder::new().config(config);
    for (name, sink) in &sinks {
        builder = builder.sink(*name, Arc::new(sink.clone()));
    }
    let mut engine = builder.build().await.expect("demo pipelines should compile");
    engine.start().await.expect("engine should start");
    Demo { engine, sinks }
}

async fn wait_for(sink: &MemorySink, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("records were not acknowledged in time");
}

/// 정상 주문 로그는 NORMAL 레이블로 전달됨
#[tokio::test]
async fn test_normal_order_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest(
            "order.log",
            br#"{"log":"[ORDER] Order created successfully","level":"INFO","order_id":"ORD-12345"}"#,
        )
        .await;
    assert_eq!(
        outcome,
        IngestOutcome::Delivered {
            label: "@ORDER_APP_NORMAL".to_owned(),
            output: "order-app".to_owned(),
        }
    );

    let record = app.delivered("order-app").await;
    assert_eq!(record.get_str("service_name"), Some("order-app"));
    assert_eq!(record.get_str("log_level"), Some("INFO"));
    assert_eq!(record.get_str("format_valid"), Some("true"));
    assert_eq!(record.get_str("is_error"), Some("false"));
    assert_eq!(record.get_str("should_route_to_error"), Some("false"));
    assert_eq!(record.get_str("order_id"), Some("ORD-12345"));
    assert_eq!(record.get_str("category"), Some("ORDER"));
    assert!(app.sink("order-app-errors").is_empty());

    app.engine.stop().await.unwrap();
}

/// ERROR 레벨 로그는 ERRORS 레이블에서 분류됨
#[tokio::test]
async fn test_error_order_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest(
            "order.log",
            br#"{"log":"[ORDER] Payment failed","level":"ERROR","order_id":"ORD-12346"}"#,
        )
        .await;
    assert!(matches!(
        outcome,
        IngestOutcome::Delivered { ref label, ref output }
            if label == "@ORDER_APP_ERRORS" && output == "order-app-errors"
    ));

    let record = app.delivered("order-app-errors").await;
    assert_eq!(record.get_str("is_error"), Some("true"));
    assert_eq!(record.get_str("should_route_to_error"), Some("true"));
    assert_eq!(record.get_str("error_type"), Some("business_error"));
    assert_eq!(record.get_str("alert_priority"), Some("HIGH"));
    assert_eq!(record.get_str("error_message"), Some("[ORDER] Payment failed"));
    assert!(app.sink("order-app").is_empty());

    app.engine.stop().await.unwrap();
}

/// 필수 필드가 없는 로그는 format_error로 분류되고 예외 없이 처리됨
#[tokio::test]
async fn test_format_error_order_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest("order.log", br#"{"order_id":"ORD-12347"}"#)
        .await;
    assert!(outcome.is_delivered());

    let record = app.delivered("order-app-errors").await;
    assert_eq!(record.get_str("format_valid"), Some("false"));
    assert_eq!(record.get_str("should_route_to_error"), Some("true"));
    assert_eq!(record.get_str("error_type"), Some("format_error"));
    assert_eq!(record.get_str("log_level"), Some("UNKNOWN"));
    assert!(
        record
            .get_str("error_message")
            .is_some_and(|m| m.contains("format validation failed"))
    );

    app.engine.stop().await.unwrap();
}

/// null/빈 값 입력도 레코드를 생성함
#[tokio::test]
async fn test_malformed_fields_still_produce_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest("order.log", br#"{"log":null,"message":"","level":null}"#)
        .await;
    assert!(outcome.is_delivered());

    let record = app.delivered("order-app-errors").await;
    assert_eq!(record.get_str("service_name"), Some("order-app"));
    assert_eq!(record.get_str("format_valid"), Some("false"));

    app.engine.stop().await.unwrap();
}

/// 출력이 재시도 한도만큼 실패한 뒤 성공하면 중복 없이 승인됨
#[tokio::test]
async fn test_retry_until_ack_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(
        config(dir.path())
            .retry_limit(3)
            .flush_interval(Duration::from_millis(200))
            .build()
            .unwrap(),
    )
    .await;
    app.sink("order-app").fail_next(3);
    let handle = app.engine.handle().unwrap();

    for i in 0..5 {
        let payload = format!(r#"{{"log":"[ORDER] created","level":"INFO","order_id":"ORD-{i}"}}"#);
        assert!(handle.ingest("order.log", payload.as_bytes()).await.is_delivered());
    }
    wait_for(app.sink("order-app"), 5).await;

    app.engine.stop().await.unwrap();
    let stats = app.engine.stats();
    let (_, normal) = stats
        .outputs
        .iter()
        .find(|(name, _)| name == "order-app")
        .unwrap();
    assert_eq!(normal.retries, 3);
    assert_eq!(normal.records_acked, 5);
    assert_eq!(normal.chunks_quarantined, 0);
    assert_eq!(app.sink("order-app").len(), 5);
    assert!(list_quarantined(dir.path()).await.unwrap().is_empty());
}

/// 재시작 시 디스크에 남은 청크가 먼저 전송됨
#[tokio::test]
async fn test_restart_recovers_buffered_chunks() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = ChunkStore::open(dir.path(), "order-app").await.unwrap();
        let (mut chunk, mut file) = store.create_chunk().await.unwrap();
        for id in ["before-crash-1", "before-crash-2"] {
            let record = Record::empty("order.log").with_id(id);
            let line = encode_line(&record).unwrap();
            store.append(&mut file, &chunk, &line).await.unwrap();
            chunk.push(record, line.len() - 1);
        }
    }

    let mut app = demo(config(dir.path()).build().unwrap()).await;
    wait_for(app.sink("order-app"), 2).await;
    let ids: Vec<_> = app.sink("order-app").records().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, ["before-crash-1", "before-crash-2"]);

    app.engine.stop().await.unwrap();
}

/// 재라우팅 순환은 홉 제한으로 드롭됨
#[tokio::test]
async fn test_reroute_cycle_hits_hop_limit() {
    let yaml = r#"
bindings:
  - { pattern: "ping", label: PING }
  - { pattern: "pong", label: PONG }
labels:
  - name: PING
    stages:
      - transform: { reroute: [ { when: true, tag: pong } ] }
    output: mem
  - name: PONG
    stages:
      - transform: { reroute: [ { when: true, tag: ping } ] }
    output: mem
outputs:
  - { name: mem, type: memory }
"#;
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfigBuilder::new()
        .storage_path(dir.path())
        .max_hops(4)
        .build()
        .unwrap();
    let mut engine = RouterEngineBuilder::new()
        .config(config)
        .pipeline(PipelineLoader::parse_yaml(yaml, "cycle").unwrap())
        .build()
        .await
        .unwrap();
    engine.start().await.unwrap();

    let outcome = engine.handle().unwrap().ingest("ping", b"loop").await;
    assert_eq!(
        outcome,
        IngestOutcome::Dropped {
            reason: DropReason::HopLimit
        }
    );

    engine.stop().await.unwrap();
    assert_eq!(engine.stats().hop_limit, 1);
    assert!(engine.memory_sink("mem").unwrap().is_empty());
}

/// reject 모드에서 승인 대기 청크가 한도에 도달하면 수집이 거부됨
#[tokio::test]
async fn test_backpressure_reject_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path())
        .backpressure(BackpressureMode::Reject)
        .intake_channel_capacity(1)
        .max_pending_chunks(1)
        .flush_bytes(1)
        .retry_limit(1000)
        .backoff(Duration::from_secs(1), Duration::from_secs(1))
        .shutdown_grace(Duration::from_millis(100))
        .build()
        .unwrap();
    let mut app = demo(config).await;
    app.sink("order-app").fail_next(u32::MAX);
    let handle = app.engine.handle().unwrap();
    let payload = br#"{"log":"[ORDER] created","level":"INFO"}"#;

    // 1. 첫 레코드: 기록 후 즉시 봉인, 전송 실패로 승인 대기
    assert!(handle.ingest("order.log", payload).await.is_delivered());

    // 2. 두 번째 레코드: 채널에 들어가지만 워커가 수신을 멈춘 상태
    let second = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.ingest("order.log", payload).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 3. 세 번째 레코드: 채널이 가득 차서 거부
    let third = handle.ingest("order.log", payload).await;
    assert_eq!(
        third,
        IngestOutcome::Rejected {
            output: "order-app".to_owned(),
            reason: IntakeError::Full,
        }
    );
    assert!(!app.engine.health_check().await.is_healthy());

    // 4. 종료: 남은 intake를 기록하고 전송하지 못한 청크는 격리
    app.engine.stop().await.unwrap();
    assert!(second.await.unwrap().is_delivered());

    let reports = app.engine.last_shutdown_reports();
    let normal = reports.iter().find(|r| r.output == "order-app").unwrap();
    assert_eq!(normal.quarantined_chunks, 2);
    assert_eq!(app.engine.stats().rejected, 1);

    let quarantined = list_quarantined(dir.path()).await.unwrap();
    assert_eq!(quarantined.len(), 2);
    assert!(quarantined.iter().all(|m| m.output == "order-app"));
}

/// 바인딩되지 않은 태그는 드롭됨
#[tokio::test]
async fn test_unbound_tag_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let outcome = app
        .engine
        .handle()
        .unwrap()
        .ingest("payment.log", br#"{"log":"hello"}"#)
        .await;
    assert_eq!(
        outcome,
        IngestOutcome::Dropped {
            reason: DropReason::NoRoute
        }
    );
    app.engine.stop().await.unwrap();
    assert_eq!(app.engine.stats().no_route, 1);
}

/// conf.d의 모든 정의 파일이 하나의 그래프로 병합됨
#[tokio::test]
async fn test_demo_directory_merges_all_services() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    // order-app 3개 + user-app 3개 + fastapi-app 2개
    assert_eq!(app.engine.graph().label_count(), 8);

    let handle = app.engine.handle().unwrap();
    for (tag, output) in [
        ("order.log", "order-app"),
        ("user.log", "user-app"),
        ("fastapi.app", "fastapi-app"),
    ] {
        let outcome = handle
            .ingest(tag, br#"{"log":"[X] ok","level":"INFO"}"#)
            .await;
        assert!(
            matches!(outcome, IngestOutcome::Delivered { output: ref o, .. } if o == output),
            "{tag}: {outcome:?}"
        );
    }
    app.engine.stop().await.unwrap();
}

/// 사용자 서비스 정상 로그는 입력 필드를 유지한 채 user-app으로 전달됨
#[tokio::test]
async fn test_user_app_normal_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest(
            "user.log",
            br#"{"log":"[USER] User login successful","level":"INFO","user_id":"USER-001","action":"login","ip_address":"192.168.1.100"}"#,
        )
        .await;
    assert_eq!(
        outcome,
        IngestOutcome::Delivered {
            label: "@USER_APP_NORMAL".to_owned(),
            output: "user-app".to_owned(),
        }
    );

    let record = app.delivered("user-app").await;
    assert_eq!(record.get_str("service_name"), Some("user-app"));
    assert_eq!(record.get_str("log_level"), Some("INFO"));
    assert_eq!(record.get_str("format_valid"), Some("true"));
    assert_eq!(record.get_str("is_error"), Some("false"));
    assert_eq!(record.get_str("user_id"), Some("USER-001"));
    assert_eq!(record.get_str("action"), Some("login"));
    assert_eq!(record.get_str("ip_address"), Some("192.168.1.100"));
    app.assert_only("user-app");

    app.engine.stop().await.unwrap();
}

/// 사용자 서비스 에러/형식 오류 로그는 user-app-errors에서 분류됨
#[tokio::test]
async fn test_user_app_errors_are_classified() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let denied = handle
        .ingest(
            "user.log",
            br#"{"log":"[USER] Permission denied","level":"ERROR","user_id":"USER-005"}"#,
        )
        .await;
    assert!(denied.is_delivered());
    let missing = handle
        .ingest("user.log", br#"{"user_id":"USER-006"}"#)
        .await;
    assert!(missing.is_delivered());

    let errors = app.sink("user-app-errors");
    wait_for(errors, 2).await;
    let by_user: BTreeMap<_, _> = errors
        .records()
        .into_iter()
        .map(|r| (r.get_str("user_id").unwrap_or_default().to_owned(), r))
        .collect();

    let denied = &by_user["USER-005"];
    assert_eq!(denied.get_str("error_type"), Some("business_error"));
    assert_eq!(denied.get_str("alert_priority"), Some("HIGH"));
    assert_eq!(denied.get_str("error_message"), Some("[USER] Permission denied"));

    let missing = &by_user["USER-006"];
    assert_eq!(missing.get_str("format_valid"), Some("false"));
    assert_eq!(missing.get_str("error_type"), Some("format_error"));
    assert!(
        missing
            .get_str("error_message")
            .is_some_and(|m| m.contains("format validation failed"))
    );
    app.assert_only("user-app-errors");

    app.engine.stop().await.unwrap();
}

/// FastAPI 성공 로그에서 엔드포인트와 상태 코드가 추출됨
#[tokio::test]
async fn test_fastapi_success_log_extracts_endpoint_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest(
            "fastapi.app",
            br#"{"log":"[FASTAPI-APP] 2026-01-07 10:00:00 - root - INFO - /test - SUCCESS - Query parameter is 'yolo' | timestamp=2026-01-07T10:00:00Z | status=200 | message=Request processed successfully","status_code":200}"#,
        )
        .await;
    assert_eq!(
        outcome,
        IngestOutcome::Delivered {
            label: "@FASTAPI_APP".to_owned(),
            output: "fastapi-app".to_owned(),
        }
    );

    let record = app.delivered("fastapi-app").await;
    assert_eq!(record.get_str("service_name"), Some("fastapi-app"));
    assert_eq!(record.get_str("is_error"), Some("false"));
    assert_eq!(record.get_str("api_endpoint"), Some("/test"));
    assert_eq!(record.get_str("status_code"), Some("200"));
    assert_eq!(record.get_str("is_health_check"), Some("false"));
    assert!(
        record
            .get_str("log_content")
            .is_some_and(|c| c.contains("SUCCESS"))
    );
    app.assert_only("fastapi-app");

    app.engine.stop().await.unwrap();
}

/// 로그 본문이 없으면 api_path/status_code 입력 필드로 대체되고 헬스 체크가 표시됨
#[tokio::test]
async fn test_fastapi_health_check_falls_back_to_input_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let outcome = handle
        .ingest(
            "fastapi.app",
            br#"{"message":"OK","api_path":"/health","status_code":200}"#,
        )
        .await;
    assert!(outcome.is_delivered());

    let record = app.delivered("fastapi-app").await;
    assert_eq!(record.get_str("log_content"), Some("OK"));
    assert_eq!(record.get_str("api_endpoint"), Some("/health"));
    assert_eq!(record.get_str("status_code"), Some("200"));
    assert_eq!(record.get_str("is_health_check"), Some("true"));

    app.engine.stop().await.unwrap();
}

/// FastAPI 에러 로그는 에러 레이블로 재라우팅되어 분류됨
#[tokio::test]
async fn test_fastapi_errors_are_categorized() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = demo(config(dir.path()).build().unwrap()).await;
    let handle = app.engine.handle().unwrap();

    let validation = handle
        .ingest(
            "fastapi.app",
            br#"{"log":"[FASTAPI-APP] 2026-01-07 10:00:00 - root - ERROR - /test - ERROR - validation failed: required field missing","api_path":"/test","status_code":400}"#,
        )
        .await;
    assert_eq!(
        validation,
        IngestOutcome::Delivered {
            label: "@FASTAPI_APP_ERRORS".to_owned(),
            output: "fastapi-app-errors".to_owned(),
        }
    );
    let general = handle
        .ingest(
            "fastapi.app",
            br#"{"log":"[FASTAPI-APP] 2026-01-07 10:00:01 - root - ERROR - /items - ERROR - database unavailable | status=503"}"#,
        )
        .await;
    assert!(general.is_delivered());

    let errors = app.sink("fastapi-app-errors");
    wait_for(errors, 2).await;
    let by_endpoint: BTreeMap<_, _> = errors
        .records()
        .into_iter()
        .map(|r| (r.get_str("api_endpoint").unwrap_or_default().to_owned(), r))
        .collect();

    let validation = &by_endpoint["/test"];
    assert_eq!(validation.get_str("is_error"), Some("true"));
    assert_eq!(validation.get_str("error_category"), Some("validation_error"));
    assert_eq!(validation.get_str("alert_priority"), Some("HIGH"));
    assert_eq!(validation.get_str("error_index_type"), Some("fastapi-error-logs"));
    assert_eq!(
        validation.get_str("troubleshoot_hint"),
        Some("Check FastAPI logs for tracebacks")
    );
    assert_eq!(validation.get_str("status_code"), Some("400"));

    let general = &by_endpoint["/items"];
    assert_eq!(general.get_str("error_category"), Some("general_error"));
    assert_eq!(general.get_str("status_code"), Some("503"));
    app.assert_only("fastapi-app-errors");

    app.engine.stop().await.unwrap();
}
