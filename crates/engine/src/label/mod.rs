//! 레이블 그래프 -- 컴파일된 레이블/바인딩/출력의 불변 아레나
//!
//! YAML 정의([`PipelineFile`])를 한 번 컴파일하여 인덱스 기반 아레나로 만듭니다.
//! 레코드 처리 중에는 이름 조회나 재파싱이 없습니다.
//!
//! # 로드 시점 검증 (모두 치명적)
//! - 레이블/출력 이름 중복
//! - 바인딩, 재라우팅, `default_label`이 정의되지 않은 레이블을 참조
//! - 레이블이 정의되지 않은 출력을 참조
//! - 잘못된 태그 패턴, 정규식, 추출 사양, 기본값 없는 조건부 규칙
//!
//! # 아키텍처
//! - [`loader`]: 디렉토리 스캔 및 YAML 파싱/병합
//! - [`types`]: 정의 파일 데이터 구조

pub mod loader;
pub mod types;

pub use loader::PipelineLoader;
pub use types::{BindingDef, LabelDef, OpenSearchSpec, OutputDef, OutputType, PipelineFile};

use std::collections::HashMap;
use std::fmt;

use crate::error::EngineError;
use crate::matcher::{TagMatcher, TagPattern};
use crate::stage::Stage;

/// 레이블 아레나 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub usize);

/// 출력 아레나 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub usize);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label#{}", self.0)
    }
}

/// 컴파일된 레이블
#[derive(Debug)]
pub struct Label {
    /// 레이블 이름 (`@` 제외)
    pub name: String,
    /// 순서가 있는 스테이지
    pub stages: Vec<Stage>,
    /// 종착 출력
    pub output: Option<OutputId>,
}

/// 레이블 그래프
#[derive(Debug)]
pub struct LabelGraph {
    labels: Vec<Label>,
    outputs: Vec<OutputDef>,
    matcher: TagMatcher<LabelId>,
    default_label: Option<LabelId>,
}

/// 레이블 이름 정규화 (`@ORDER_APP` → `ORDER_APP`)
pub fn normalize_label_name(name: &str) -> &str {
    name.trim_start_matches('@')
}

impl LabelGraph {
    /// 정의를 컴파일합니다.
    ///
    /// `default_label`은 어떤 바인딩과도 일치하지 않는 태그가 향할 레이블입니다.
    pub fn compile(file: &PipelineFile, default_label: Option<&str>) -> Result<Self, EngineError> {
        if file.labels.is_empty() {
            return Err(EngineError::PipelineLoad {
                path: "(pipeline)".to_owned(),
                reason: "no labels defined".to_owned(),
            });
        }

        // 1. 레이블 이름 → ID
        let mut label_ids: HashMap<String, LabelId> = HashMap::with_capacity(file.labels.len());
        for (index, def) in file.labels.iter().enumerate() {
            let name = normalize_label_name(&def.name);
            if name.is_empty() {
                return Err(EngineError::Label {
                    label: def.name.clone(),
                    reason: "label name must not be empty".to_owned(),
                });
            }
            if label_ids.insert(name.to_owned(), LabelId(index)).is_some() {
                return Err(EngineError::Label {
                    label: name.to_owned(),
                    reason: "duplicate label name".to_owned(),
                });
            }
        }

        // 2. 출력 이름 → ID
        let mut output_ids: HashMap<&str, OutputId> = HashMap::with_capacity(file.outputs.len());
        for (index, def) in file.outputs.iter().enumerate() {
            def.validate()?;
            if output_ids.insert(def.name.as_str(), OutputId(index)).is_some() {
                return Err(EngineError::Output {
                    output: def.name.clone(),
                    reason: "duplicate output name".to_owned(),
                });
            }
        }

        // 3. 스테이지 컴파일 및 출력 참조 해석
        let mut labels = Vec::with_capacity(file.labels.len());
        for def in &file.labels {
            let name = normalize_label_name(&def.name).to_owned();
            let stages = def
                .stages
                .iter()
                .enumerate()
                .map(|(index, spec)| {
                    Stage::compile(spec, &label_ids, &format!("label '{name}' stage {index}"))
                })
                .collect::<Result<Vec<_>, EngineError>>()?;

            let output = match &def.output {
                Some(output_name) => Some(*output_ids.get(output_name.as_str()).ok_or_else(
                    || EngineError::Output {
                        output: output_name.clone(),
                        reason: format!("referenced by label '{name}' but not defined"),
                    },
                )?),
                None => None,
            };

            if output.is_none() && !stages.iter().any(Stage::can_reroute) {
                tracing::warn!(
                    label = %name,
                    "label has no output and no reroute; every record reaching it will be dropped"
                );
            }

            labels.push(Label {
                name,
                stages,
                output,
            });
        }

        // 4. 바인딩
        let mut bindings = Vec::with_capacity(file.bindings.len());
        for binding in &file.bindings {
            let pattern = TagPattern::parse(&binding.pattern)?;
            let target = normalize_label_name(&binding.label);
            let id = *label_ids.get(target).ok_or_else(|| EngineError::Label {
                label: target.to_owned(),
                reason: format!("binding '{}' references undefined label", binding.pattern),
            })?;
            bindings.push((pattern, id));
        }

        // 5. 기본 레이블
        let default_label = match default_label.map(normalize_label_name) {
            Some(name) if !name.is_empty() => {
                Some(*label_ids.get(name).ok_or_else(|| EngineError::Label {
                    label: name.to_owned(),
                    reason: "default_label references undefined label".to_owned(),
                })?)
            }
            _ => None,
        };

        for (index, def) in file.outputs.iter().enumerate() {
            if !labels.iter().any(|l| l.output == Some(OutputId(index))) {
                tracing::warn!(output = %def.name, "output is not referenced by any label");
            }
        }

        Ok(Self {
            labels,
            outputs: file.outputs.clone(),
            matcher: TagMatcher::new(bindings),
            default_label,
        })
    }

    /// 태그에 해당하는 레이블을 결정합니다. 일치하지 않으면 기본 레이블입니다.
    pub fn resolve(&self, tag: &str) -> Option<LabelId> {
        self.matcher.resolve(tag).copied().or(self.default_label)
    }

    /// 레이블 조회
    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0]
    }

    /// 이름으로 레이블 ID 조회
    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        let name = normalize_label_name(name);
        self.labels
            .iter()
            .position(|l| l.name == name)
            .map(LabelId)
    }

    /// 레이블 이름
    pub fn label_name(&self, id: LabelId) -> &str {
        &self.labels[id.0].name
    }

    /// 출력 정의 조회
    pub fn output(&self, id: OutputId) -> &OutputDef {
        &self.outputs[id.0]
    }

    /// 모든 출력 정의 (ID 순서)
    pub fn outputs(&self) -> impl Iterator<Item = (OutputId, &OutputDef)> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, def)| (OutputId(index), def))
    }

    /// 레이블 수
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// 기본 레이블
    pub fn default_label(&self) -> Option<LabelId> {
        self.default_label
    }
}
