//! 필터 스테이지 -- 조건에 따라 레코드를 통과시키거나 드롭합니다.
//!
//! 각 조건은 `(key, pattern)` 쌍이며 필드의 텍스트 표현에 정규식을 적용합니다.
//! 필드가 없거나 null이면 조건은 거짓입니다. 따라서:
//!
//! | 모드 | 필드 없음 |
//! |------|-----------|
//! | `include` | 드롭 |
//! | `exclude` | 통과 |
//!
//! ```yaml
//! filter:
//!   mode: include
//!   combine: all
//!   conditions:
//!     - { key: should_route_to_error, pattern: '^true$' }
//! ```

use regex::Regex;
use serde::Deserialize;

use logroute_core::types::Record;

use crate::error::EngineError;

/// 필터 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// 조건이 참인 레코드만 통과
    #[default]
    Include,
    /// 조건이 참인 레코드를 드롭
    Exclude,
}

/// 여러 조건의 결합 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// 모두 참
    #[default]
    All,
    /// 하나라도 참
    Any,
}

/// 필터 조건 사양
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    /// 필드 이름
    pub key: String,
    /// 정규식
    pub pattern: String,
}

/// 필터 스테이지 사양 (YAML)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    /// 모드
    #[serde(default)]
    pub mode: FilterMode,
    /// 결합 방식
    #[serde(default)]
    pub combine: Combine,
    /// 조건 목록 (비어 있으면 안 됨)
    pub conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Clone)]
struct Condition {
    key: String,
    regex: Regex,
}

impl Condition {
    fn holds(&self, record: &Record) -> bool {
        record
            .get(&self.key)
            .and_then(|value| value.to_text())
            .is_some_and(|text| self.regex.is_match(&text))
    }
}

/// 컴파일된 필터 스테이지
#[derive(Debug, Clone)]
pub struct FilterStage {
    mode: FilterMode,
    combine: Combine,
    conditions: Vec<Condition>,
}

impl FilterStage {
    /// 사양을 컴파일합니다.
    pub fn compile(spec: &FilterSpec, context: &str) -> Result<Self, EngineError> {
        if spec.conditions.is_empty() {
            return Err(EngineError::Stage {
                context: context.to_owned(),
                reason: "filter requires at least one condition".to_owned(),
            });
        }

        let conditions = spec
            .conditions
            .iter()
            .map(|c| {
                let regex = Regex::new(&c.pattern).map_err(|e| EngineError::Stage {
                    context: context.to_owned(),
                    reason: format!("filter key '{}': invalid pattern: {e}", c.key),
                })?;
                Ok(Condition {
                    key: c.key.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self {
            mode: spec.mode,
            combine: spec.combine,
            conditions,
        })
    }

    /// 결합된 조건의 진리값
    fn predicate(&self, record: &Record) -> bool {
        match self.combine {
            Combine::All => self.conditions.iter().all(|c| c.holds(record)),
            Combine::Any => self.conditions.iter().any(|c| c.holds(record)),
        }
    }

    /// 레코드가 필터를 통과하는지 판단합니다.
    pub fn passes(&self, record: &Record) -> bool {
        match self.mode {
            FilterMode::Include => self.predicate(record),
            FilterMode::Exclude => !self.predicate(record),
        }
    }
}
