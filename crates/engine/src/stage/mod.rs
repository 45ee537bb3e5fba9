//! 처리 스테이지 -- 레이블에 속한 변환/필터 단위
//!
//! 스테이지는 로드 시점에 한 번 컴파일되고 이후 읽기 전용으로 공유됩니다.
//! [`Stage::run`]은 `&self`만 필요하므로 여러 태스크에서 동시에 호출할 수 있습니다.
//!
//! ```yaml
//! stages:
//!   - transform: { set: [ { field: service_name, value: order-app } ] }
//!   - filter: { conditions: [ { key: level, pattern: ERROR } ] }
//! ```

pub mod filter;
pub mod transform;

pub use filter::{FilterSpec, FilterStage};
pub use transform::{Reroute, TransformSpec, TransformStage};

use std::collections::HashMap;

use serde::Deserialize;

use logroute_core::types::Record;

use crate::error::EngineError;
use crate::label::LabelId;

/// 스테이지 사양 (YAML, 단일 키 맵)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSpec {
    /// 변환
    Transform(TransformSpec),
    /// 필터
    Filter(FilterSpec),
}

/// 스테이지 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// 다음 스테이지로 진행
    Continue,
    /// 필터에 의해 드롭
    Drop,
    /// 다른 레이블/태그로 재라우팅
    Reroute(Reroute),
}

/// 컴파일된 스테이지
#[derive(Debug, Clone)]
pub enum Stage {
    /// 변환
    Transform(TransformStage),
    /// 필터
    Filter(FilterStage),
}

impl Stage {
    /// 사양을 컴파일합니다.
    pub fn compile(
        spec: &StageSpec,
        labels: &HashMap<String, LabelId>,
        context: &str,
    ) -> Result<Self, EngineError> {
        match spec {
            StageSpec::Transform(t) => Ok(Self::Transform(TransformStage::compile(t, labels, context)?)),
            StageSpec::Filter(f) => Ok(Self::Filter(FilterStage::compile(f, context)?)),
        }
    }

    /// 레코드에 스테이지를 적용합니다.
    pub fn run(&self, record: &mut Record) -> StageOutcome {
        match self {
            Self::Transform(stage) => match stage.apply(record) {
                Some(reroute) => StageOutcome::Reroute(reroute),
                None => StageOutcome::Continue,
            },
            Self::Filter(stage) => {
                if stage.passes(record) {
                    StageOutcome::Continue
                } else {
                    StageOutcome::Drop
                }
            }
        }
    }

    /// 재라우팅을 만들 수 있는 스테이지인지 여부
    pub fn can_reroute(&self) -> bool {
        matches!(self, Self::Transform(t) if t.has_reroute())
    }

    /// 스테이지 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::Filter(_) => "filter",
        }
    }
}
