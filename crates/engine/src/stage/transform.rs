//! 변환 스테이지 -- 레코드 필드를 순서대로 변경합니다.
//!
//! 적용 순서는 고정입니다: `rename` → `parse` → `set` → `remove` → `reroute`.
//! `set` 규칙은 선언 순서대로 평가되며, 각 규칙은 앞선 규칙이 쓴 값을 읽습니다.
//!
//! ```yaml
//! transform:
//!   rename:
//!     - { from: message, to: log }
//!   parse:
//!     - source: log
//!       fields:
//!         path: first_path
//!   set:
//!     - { field: service_name, value: order-app }
//!     - field: log_level
//!       expr: { field: level }
//!       default: UNKNOWN
//!   remove: [ message ]
//!   reroute:
//!     - when: { equals: { of: { field: should_route_to_error }, value: "true" } }
//!       label: ORDER_APP_ERRORS
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use logroute_core::types::{FieldValue, Record};

use crate::error::EngineError;
use crate::expr::{Expr, ExprSpec};
use crate::extract::{ExtractSpec, ExtractorSet};
use crate::label::LabelId;

/// 변환 스테이지 사양 (YAML)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSpec {
    /// 필드 이름 변경
    #[serde(default)]
    pub rename: Vec<RenameRule>,
    /// 텍스트 필드에서 추출
    #[serde(default)]
    pub parse: Vec<ParseRule>,
    /// 필드 설정
    #[serde(default)]
    pub set: Vec<SetRule>,
    /// 필드 삭제
    #[serde(default)]
    pub remove: Vec<String>,
    /// 조건부 재라우팅
    #[serde(default)]
    pub reroute: Vec<RerouteRule>,
}

/// 이름 변경 규칙
///
/// 대상 필드가 이미 있으면 `overwrite: true`가 아닌 한 건너뜁니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRule {
    /// 원본 필드
    pub from: String,
    /// 대상 필드
    pub to: String,
    /// 대상이 있어도 덮어쓰기
    #[serde(default)]
    pub overwrite: bool,
}

/// 추출 규칙
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParseRule {
    /// 추출 대상 텍스트 필드
    pub source: String,
    /// 대상 필드 → 추출 사양
    pub fields: BTreeMap<String, ExtractSpec>,
}

/// 필드 설정 규칙
///
/// `value`(정적) 또는 `expr`(조건부) 중 정확히 하나를 가져야 합니다.
/// `expr` 규칙은 평가 결과가 null일 때 쓰일 `default`가 필수입니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRule {
    /// 대상 필드
    pub field: String,
    /// 정적 값 (`~`이면 null을 씀)
    #[serde(default, deserialize_with = "explicit_value")]
    pub value: Option<FieldValue>,
    /// 조건식
    #[serde(default)]
    pub expr: Option<ExprSpec>,
    /// 조건식 결과가 null일 때의 값
    #[serde(default, deserialize_with = "explicit_value")]
    pub default: Option<FieldValue>,
}

/// 키가 있으면 `null`도 값으로 취급합니다 (키가 없을 때만 `None`).
fn explicit_value<'de, D>(deserializer: D) -> Result<Option<FieldValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    FieldValue::deserialize(deserializer).map(Some)
}

/// 재라우팅 규칙
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RerouteRule {
    /// 조건 (참이면 재라우팅)
    pub when: ExprSpec,
    /// 새 태그
    #[serde(default)]
    pub tag: Option<String>,
    /// 직접 지정할 레이블
    #[serde(default)]
    pub label: Option<String>,
}

/// 재라우팅 지시
///
/// 태그만 있으면 매처로 레이블을 다시 결정하고,
/// 레이블이 있으면 해당 레이블로 직접 이동합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reroute {
    /// 새 태그
    pub tag: Option<String>,
    /// 대상 레이블
    pub label: Option<LabelId>,
}

#[derive(Debug, Clone)]
enum Derivation {
    Static(FieldValue),
    Computed { expr: Expr, default: FieldValue },
}

#[derive(Debug, Clone)]
struct CompiledSet {
    field: String,
    derivation: Derivation,
}

#[derive(Debug, Clone)]
struct CompiledParse {
    source: String,
    extractors: ExtractorSet,
}

#[derive(Debug, Clone)]
struct CompiledReroute {
    when: Expr,
    target: Reroute,
}

/// 컴파일된 변환 스테이지
#[derive(Debug, Clone)]
pub struct TransformStage {
    rename: Vec<RenameRule>,
    parse: Vec<CompiledParse>,
    set: Vec<CompiledSet>,
    remove: Vec<String>,
    reroute: Vec<CompiledReroute>,
}

impl TransformStage {
    /// 사양을 컴파일합니다.
    ///
    /// `labels`는 레이블 이름 → ID 맵이며, 재라우팅 대상 검증에 사용됩니다.
    pub fn compile(
        spec: &TransformSpec,
        labels: &HashMap<String, LabelId>,
        context: &str,
    ) -> Result<Self, EngineError> {
        let stage_err = |reason: String| EngineError::Stage {
            context: context.to_owned(),
            reason,
        };

        for rule in &spec.rename {
            if rule.from.is_empty() || rule.to.is_empty() {
                return Err(stage_err("rename requires non-empty 'from' and 'to'".to_owned()));
            }
        }

        let parse = spec
            .parse
            .iter()
            .map(|rule| {
                Ok(CompiledParse {
                    source: rule.source.clone(),
                    extractors: ExtractorSet::compile(&rule.fields).map_err(|e| {
                        stage_err(format!("parse '{}': {e}", rule.source))
                    })?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let mut set = Vec::with_capacity(spec.set.len());
        for rule in &spec.set {
            if rule.field.is_empty() {
                return Err(stage_err("set rule with empty field name".to_owned()));
            }
            let derivation = match (&rule.value, &rule.expr) {
                (Some(value), None) => Derivation::Static(value.clone()),
                (None, Some(expr)) => {
                    let default = rule.default.clone().ok_or_else(|| {
                        stage_err(format!(
                            "set '{}': conditional rule requires a 'default'",
                            rule.field
                        ))
                    })?;
                    let rule_context = format!("{context}: set '{}'", rule.field);
                    Derivation::Computed {
                        expr: Expr::compile(expr, &rule_context)?,
                        default,
                    }
                }
                _ => {
                    return Err(stage_err(format!(
                        "set '{}': exactly one of 'value' or 'expr' is required",
                        rule.field
                    )));
                }
            };
            set.push(CompiledSet {
                field: rule.field.clone(),
                derivation,
            });
        }

        let mut reroute = Vec::with_capacity(spec.reroute.len());
        for (index, rule) in spec.reroute.iter().enumerate() {
            let label = match &rule.label {
                Some(name) => {
                    let name = name.trim_start_matches('@');
                    Some(*labels.get(name).ok_or_else(|| EngineError::Label {
                        label: name.to_owned(),
                        reason: format!("{context}: reroute references undefined label"),
                    })?)
                }
                None => None,
            };
            if label.is_none() && rule.tag.is_none() {
                return Err(stage_err(format!(
                    "reroute #{index}: 'tag' or 'label' is required"
                )));
            }
            if rule.tag.as_deref().is_some_and(str::is_empty) {
                return Err(stage_err(format!("reroute #{index}: empty tag")));
            }
            reroute.push(CompiledReroute {
                when: Expr::compile(&rule.when, &format!("{context}: reroute #{index}"))?,
                target: Reroute {
                    tag: rule.tag.clone(),
                    label,
                },
            });
        }

        Ok(Self {
            rename: spec.rename.clone(),
            parse,
            set,
            remove: spec.remove.clone(),
            reroute,
        })
    }

    /// 레코드에 변환을 적용하고, 재라우팅 지시가 있으면 반환합니다.
    ///
    /// I/O나 블로킹이 없으며 공유 상태를 변경하지 않습니다.
    pub fn apply(&self, record: &mut Record) -> Option<Reroute> {
        for rule in &self.rename {
            if !rule.overwrite && record.fields.contains_key(&rule.to) {
                continue;
            }
            if let Some(value) = record.remove(&rule.from) {
                record.set(rule.to.clone(), value);
            }
        }

        for rule in &self.parse {
            let extracted = match record.get(&rule.source).and_then(FieldValue::to_text) {
                Some(text) => rule.extractors.extract(&text),
                None => continue,
            };
            for (field, value) in extracted {
                record.set(field, value);
            }
        }

        for rule in &self.set {
            let value = match &rule.derivation {
                Derivation::Static(value) => value.clone(),
                Derivation::Computed { expr, default } => {
                    let value = expr.eval(record);
                    if value.is_null() { default.clone() } else { value }
                }
            };
            record.set(rule.field.clone(), value);
        }

        for field in &self.remove {
            record.remove(field);
        }

        self.reroute
            .iter()
            .find(|rule| rule.when.test(record))
            .map(|rule| rule.target.clone())
    }

    /// 재라우팅 규칙 보유 여부
    pub fn has_reroute(&self) -> bool {
        !self.reroute.is_empty()
    }
}
