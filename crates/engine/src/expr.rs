//! 조건식 모델 -- 변환 규칙과 재라우팅 조건에 쓰이는 닫힌 표현식 집합
//!
//! 임베디드 스크립트 대신 작은 표현식 트리를 로드 시점에 컴파일하고,
//! 레코드마다 [`Expr::eval`]로 평가합니다. 평가는 전역 함수(total)입니다.
//! 입력 필드가 없으면 `null`을 반환하며, 호출 측 규칙이 `default`로 대체합니다.
//!
//! # YAML 형식
//!
//! 스칼라는 상수이고, 단일 키 맵은 연산자입니다.
//!
//! ```yaml
//! expr:
//!   if:
//!     cond:
//!       any:
//!         - equals: { of: { field: level }, value: ERROR }
//!         - equals: { of: { field: format_valid }, value: "false" }
//!     then: "true"
//!     else: "false"
//! ```

use regex::Regex;
use serde::Deserialize;

use logroute_core::types::{FieldValue, Record};

use crate::error::EngineError;
use crate::extract::{ExtractSpec, Extractor};

/// 표현식 사양 (YAML)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExprSpec {
    /// 연산자 (단일 키 맵)
    Op(Box<OpSpec>),
    /// 스칼라 상수
    Literal(FieldValue),
}

/// 연산자 사양
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpSpec {
    /// 상수
    Const(FieldValue),
    /// 필드 참조
    Field(String),
    /// null/빈 문자열이 아닌 첫 번째 값
    Coalesce(Vec<ExprSpec>),
    /// 부분 문자열 포함 여부
    Contains {
        /// 대상
        of: ExprSpec,
        /// 찾을 문자열
        value: String,
    },
    /// 정규식 일치 여부
    Matches {
        /// 대상
        of: ExprSpec,
        /// 정규식
        pattern: String,
    },
    /// 텍스트 표현 동등 비교
    Equals {
        /// 대상
        of: ExprSpec,
        /// 비교 값
        value: FieldValue,
    },
    /// 필드가 존재하고 비어 있지 않은지
    Present(String),
    /// 모두 참
    All(Vec<ExprSpec>),
    /// 하나라도 참
    Any(Vec<ExprSpec>),
    /// 부정
    Not(ExprSpec),
    /// 삼항 조건
    If {
        /// 조건
        cond: ExprSpec,
        /// 참일 때 값
        then: ExprSpec,
        /// 거짓일 때 값
        #[serde(rename = "else")]
        otherwise: ExprSpec,
    },
    /// 필드 추출기 호출
    Extract {
        /// 대상 텍스트
        of: ExprSpec,
        /// 추출 사양
        spec: ExtractSpec,
    },
    /// 문자열 연결 (null은 건너뜀)
    Concat(Vec<ExprSpec>),
}

/// 컴파일된 표현식
#[derive(Debug, Clone)]
pub enum Expr {
    Const(FieldValue),
    Field(String),
    Coalesce(Vec<Expr>),
    Contains(Box<Expr>, String),
    Matches(Box<Expr>, Regex),
    Equals(Box<Expr>, String),
    Present(String),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Not(Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Extract(Box<Expr>, Extractor),
    Concat(Vec<Expr>),
}

impl Expr {
    /// 사양을 컴파일합니다. 정규식/추출기 오류는 `context`와 함께 반환됩니다.
    pub fn compile(spec: &ExprSpec, context: &str) -> Result<Self, EngineError> {
        let op = match spec {
            ExprSpec::Literal(value) => return Ok(Self::Const(value.clone())),
            ExprSpec::Op(op) => op.as_ref(),
        };

        let compile_all = |specs: &[ExprSpec]| -> Result<Vec<Expr>, EngineError> {
            specs.iter().map(|s| Self::compile(s, context)).collect()
        };
        let boxed = |spec: &ExprSpec| -> Result<Box<Expr>, EngineError> {
            Ok(Box::new(Self::compile(spec, context)?))
        };

        let expr = match op {
            OpSpec::Const(value) => Self::Const(value.clone()),
            OpSpec::Field(name) => Self::Field(name.clone()),
            OpSpec::Coalesce(items) => Self::Coalesce(non_empty(compile_all(items)?, "coalesce", context)?),
            OpSpec::Contains { of, value } => Self::Contains(boxed(of)?, value.clone()),
            OpSpec::Matches { of, pattern } => {
                let regex = Regex::new(pattern).map_err(|e| EngineError::Stage {
                    context: context.to_owned(),
                    reason: format!("invalid pattern '{pattern}': {e}"),
                })?;
                Self::Matches(boxed(of)?, regex)
            }
            OpSpec::Equals { of, value } => {
                let text = value.to_text().map(|t| t.into_owned()).ok_or_else(|| {
                    EngineError::Stage {
                        context: context.to_owned(),
                        reason: "equals: comparing against null, use 'present' instead".to_owned(),
                    }
                })?;
                Self::Equals(boxed(of)?, text)
            }
            OpSpec::Present(name) => Self::Present(name.clone()),
            OpSpec::All(items) => Self::All(non_empty(compile_all(items)?, "all", context)?),
            OpSpec::Any(items) => Self::Any(non_empty(compile_all(items)?, "any", context)?),
            OpSpec::Not(inner) => Self::Not(boxed(inner)?),
            OpSpec::If {
                cond,
                then,
                otherwise,
            } => Self::If(boxed(cond)?, boxed(then)?, boxed(otherwise)?),
            OpSpec::Extract { of, spec } => {
                let extractor = Extractor::compile(spec).map_err(|e| EngineError::Stage {
                    context: context.to_owned(),
                    reason: e.to_string(),
                })?;
                Self::Extract(boxed(of)?, extractor)
            }
            OpSpec::Concat(items) => Self::Concat(non_empty(compile_all(items)?, "concat", context)?),
        };
        Ok(expr)
    }

    /// 레코드에 대해 표현식을 평가합니다.
    pub fn eval(&self, record: &Record) -> FieldValue {
        match self {
            Self::Const(value) => value.clone(),
            Self::Field(name) => record.get(name).cloned().unwrap_or(FieldValue::Null),
            Self::Coalesce(items) => items
                .iter()
                .map(|e| e.eval(record))
                .find(|v| !is_blank(v))
                .unwrap_or(FieldValue::Null),
            Self::Contains(of, needle) => match of.eval(record).to_text() {
                Some(text) => FieldValue::Bool(text.contains(needle.as_str())),
                None => FieldValue::Null,
            },
            Self::Matches(of, regex) => match of.eval(record).to_text() {
                Some(text) => FieldValue::Bool(regex.is_match(&text)),
                None => FieldValue::Null,
            },
            Self::Equals(of, expected) => match of.eval(record).to_text() {
                Some(text) => FieldValue::Bool(text == expected.as_str()),
                None => FieldValue::Null,
            },
            Self::Present(name) => {
                FieldValue::Bool(record.get(name).is_some_and(|v| !is_blank(v)))
            }
            Self::All(items) => FieldValue::Bool(items.iter().all(|e| e.eval(record).is_truthy())),
            Self::Any(items) => FieldValue::Bool(items.iter().any(|e| e.eval(record).is_truthy())),
            Self::Not(inner) => FieldValue::Bool(!inner.eval(record).is_truthy()),
            Self::If(cond, then, otherwise) => {
                if cond.eval(record).is_truthy() {
                    then.eval(record)
                } else {
                    otherwise.eval(record)
                }
            }
            Self::Extract(of, extractor) => of
                .eval(record)
                .to_text()
                .and_then(|text| extractor.extract(&text))
                .map(FieldValue::Str)
                .unwrap_or(FieldValue::Null),
            Self::Concat(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|e| e.eval(record).to_text().map(|t| t.into_owned()))
                    .collect();
                if parts.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Str(parts.concat())
                }
            }
        }
    }

    /// 진리값으로 평가합니다 (null은 거짓).
    pub fn test(&self, record: &Record) -> bool {
        self.eval(record).is_truthy()
    }
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Str(s) => s.is_empty(),
        _ => false,
    }
}

fn non_empty(items: Vec<Expr>, op: &str, context: &str) -> Result<Vec<Expr>, EngineError> {
    if items.is_empty() {
        return Err(EngineError::Stage {
            context: context.to_owned(),
            reason: format!("'{op}' requires at least one operand"),
        });
    }
    Ok(items)
}
