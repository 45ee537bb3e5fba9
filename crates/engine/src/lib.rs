#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`decode`]: 원시 페이로드 → [`Record`](logroute_core::types::Record) (JSON 객체 / 비정형 텍스트)
//! - [`matcher`]: 태그 패턴(`*`, `**`, `{a,b}`)과 가장 구체적인 바인딩 선택
//! - [`extract`]: 비정형 텍스트에서 값 추출 (정규식, 경로, key=value, 레벨)
//! - [`expr`]: 레코드에 대한 전체 함수(total) 표현식
//! - [`stage`]: 변환/필터 스테이지
//! - [`label`]: YAML 정의 로드와 레이블 그래프 컴파일
//! - [`router`]: 스테이지 실행, 재라우팅, 홉 제한
//! - [`sink`]: 청크 버퍼, 재시도, 격리, 출력 구현
//! - [`engine`]: 전체 흐름 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 엔진 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! payload -> PayloadDecoder -> TagMatcher -> Label(stages) --reroute--> Label ... -> SinkWorker -> output
//!                                              |                                       |
//!                                      Transform / Filter                   chunk + fsync + retry
//! ```

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod expr;
pub mod extract;
pub mod label;
pub mod matcher;
pub mod router;
pub mod sink;
pub mod stage;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{EngineHandle, EngineStats, IngestOutcome, RouterEngine, RouterEngineBuilder};

// 설정
pub use config::{BackpressureMode, EngineConfig, EngineConfigBuilder, SinkSettings};

// 에러
pub use error::EngineError;

// 레이블 정의
pub use label::{LabelGraph, LabelId, OutputId, PipelineFile, PipelineLoader};

// 라우팅
pub use matcher::{TagMatcher, TagPattern};
pub use router::{DropReason, RouteOutcome, Router};

// 스테이지
pub use expr::{Expr, ExprSpec};
pub use extract::{ExtractSpec, Extractor, ExtractorSet};
pub use stage::{Stage, StageOutcome, StageSpec};

// 싱크
pub use sink::{
    BulkOutcome, BulkSink, DynBulkSink, IntakeError, MemorySink, OpenSearchSink, QuarantineMeta,
    ShutdownReport, StdoutSink,
};
