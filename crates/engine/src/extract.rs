//! 필드 추출기 -- 비정형 로그 라인에서 구조화 필드를 추출합니다.
//!
//! 추출은 순수 함수입니다. 같은 입력은 항상 같은 결과를 내며,
//! 어떤 입력에 대해서도 패닉하지 않습니다. 일치하지 않으면 `None`입니다.
//!
//! # 추출 방식
//!
//! ```yaml
//! fields:
//!   path: first_path                 # 첫 번째 '/'로 시작하는 토큰
//!   status:
//!     key_value: { key: status, digits: true }
//!   category: bracket_tag            # "[ORDER] ..." -> "ORDER"
//!   severity: level                  # 첫 번째 로그 레벨 토큰
//!   endpoint:
//!     regex: { pattern: '-\s+(/[^\s]+)\s+-' }
//! ```

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::EngineError;

/// 선언적 추출 사양 (YAML)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractSpec {
    /// 정규식 캡처. `group`이 있으면 이름 있는 그룹, 없으면 첫 번째 그룹,
    /// 그룹이 없는 패턴이면 전체 일치 문자열
    Regex {
        /// 정규식 패턴
        pattern: String,
        /// 이름 있는 캡처 그룹
        #[serde(default)]
        group: Option<String>,
    },
    /// `/`로 시작하는 첫 번째 공백 구분 토큰
    FirstPath,
    /// `key=` 다음 값
    KeyValue {
        /// 키 이름
        key: String,
        /// 선행 숫자만 취함
        #[serde(default)]
        digits: bool,
    },
    /// 선두 `[...]` 안의 텍스트
    BracketTag,
    /// 첫 번째 로그 레벨 토큰 (대문자)
    Level,
}

/// 컴파일된 추출기
#[derive(Debug, Clone)]
pub enum Extractor {
    /// 정규식
    Regex {
        /// 컴파일된 패턴
        regex: Regex,
        /// 이름 있는 그룹
        group: Option<String>,
    },
    /// 첫 경로 토큰
    FirstPath,
    /// key=value
    KeyValue {
        /// `key=` 접두어
        prefix: String,
        /// 숫자만
        digits: bool,
    },
    /// `[TAG]`
    BracketTag,
    /// 로그 레벨
    Level,
}

/// 로그 레벨 토큰 → 정규화된 이름
const LEVEL_TOKENS: &[(&str, &str)] = &[
    ("TRACE", "TRACE"),
    ("DEBUG", "DEBUG"),
    ("INFO", "INFO"),
    ("WARN", "WARN"),
    ("WARNING", "WARN"),
    ("ERROR", "ERROR"),
    ("FATAL", "FATAL"),
    ("CRITICAL", "CRITICAL"),
];

impl Extractor {
    /// 사양을 컴파일합니다. 정규식 오류와 존재하지 않는 그룹 이름은 로드 시점 에러입니다.
    pub fn compile(spec: &ExtractSpec) -> Result<Self, EngineError> {
        match spec {
            ExtractSpec::Regex { pattern, group } => {
                let regex = Regex::new(pattern).map_err(|e| EngineError::Stage {
                    context: format!("extract regex '{pattern}'"),
                    reason: e.to_string(),
                })?;
                if let Some(name) = group {
                    if !regex.capture_names().flatten().any(|n| n == name) {
                        return Err(EngineError::Stage {
                            context: format!("extract regex '{pattern}'"),
                            reason: format!("no capture group named '{name}'"),
                        });
                    }
                }
                Ok(Self::Regex {
                    regex,
                    group: group.clone(),
                })
            }
            ExtractSpec::FirstPath => Ok(Self::FirstPath),
            ExtractSpec::KeyValue { key, digits } => {
                if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
                    return Err(EngineError::Stage {
                        context: "extract key_value".to_owned(),
                        reason: format!("invalid key '{key}'"),
                    });
                }
                Ok(Self::KeyValue {
                    prefix: format!("{key}="),
                    digits: *digits,
                })
            }
            ExtractSpec::BracketTag => Ok(Self::BracketTag),
            ExtractSpec::Level => Ok(Self::Level),
        }
    }

    /// 텍스트에서 값을 추출합니다.
    pub fn extract(&self, text: &str) -> Option<String> {
        match self {
            Self::Regex { regex, group } => {
                let caps = regex.captures(text)?;
                let matched = match group {
                    Some(name) => caps.name(name),
                    None => caps.get(1).or_else(|| caps.get(0)),
                };
                matched.map(|m| m.as_str().to_owned())
            }
            Self::FirstPath => text
                .split_whitespace()
                .find(|token| token.starts_with('/'))
                .map(|token| token.trim_end_matches(['"', '\'', ',', ';']))
                .filter(|path| !path.is_empty())
                .map(str::to_owned),
            Self::KeyValue { prefix, digits } => extract_key_value(text, prefix, *digits),
            Self::BracketTag => {
                let rest = text.trim_start().strip_prefix('[')?;
                let end = rest.find(']')?;
                let inner = rest[..end].trim();
                (!inner.is_empty()).then(|| inner.to_owned())
            }
            Self::Level => text
                .split(|c: char| !c.is_ascii_alphabetic())
                .find_map(|token| {
                    LEVEL_TOKENS
                        .iter()
                        .find(|(raw, _)| *raw == token)
                        .map(|(_, normalized)| (*normalized).to_owned())
                }),
        }
    }
}

/// `key=` 다음 값을 찾습니다. 키는 토큰 경계에서 시작해야 합니다.
fn extract_key_value(text: &str, prefix: &str, digits: bool) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(prefix) {
        let start = search_from + offset;
        let at_boundary = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));

        if at_boundary {
            let value_start = start + prefix.len();
            let value: &str = text[value_start..]
                .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '&'))
                .next()
                .unwrap_or_default();
            let value = value.trim_matches('"');

            let value = if digits {
                let end = value
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(value.len());
                &value[..end]
            } else {
                value
            };

            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
        search_from = start + prefix.len();
    }
    None
}

/// 한 소스 필드에서 여러 대상 필드를 추출하는 집합
#[derive(Debug, Clone, Default)]
pub struct ExtractorSet {
    targets: Vec<(String, Extractor)>,
}

impl ExtractorSet {
    /// 대상 필드명 → 사양 맵에서 생성합니다.
    pub fn compile(specs: &BTreeMap<String, ExtractSpec>) -> Result<Self, EngineError> {
        let targets = specs
            .iter()
            .map(|(field, spec)| Ok((field.clone(), Extractor::compile(spec)?)))
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Self { targets })
    }

    /// 일치한 필드만 담은 맵을 반환합니다.
    pub fn extract(&self, text: &str) -> BTreeMap<String, String> {
        self.targets
            .iter()
            .filter_map(|(field, extractor)| {
                extractor.extract(text).map(|value| (field.clone(), value))
            })
            .collect()
    }

    /// 대상 필드 수
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_LINE: &str =
        r#"2024-01-15 10:30:00 - /api/orders - INFO - GET /api/orders status=200 duration=35ms"#;

    fn compile(spec: ExtractSpec) -> Extractor {
        Extractor::compile(&spec).unwrap()
    }

    #[test]
    fn regex_first_group() {
        let ex = compile(ExtractSpec::Regex {
            pattern: r"-\s+(/[^\s]+)\s+-".to_owned(),
            group: None,
        });
        assert_eq!(ex.extract(ACCESS_LINE).as_deref(), Some("/api/orders"));
    }

    #[test]
    fn regex_named_group_and_whole_match() {
        let named = compile(ExtractSpec::Regex {
            pattern: r"duration=(?P<ms>\d+)ms".to_owned(),
            group: Some("ms".to_owned()),
        });
        assert_eq!(named.extract(ACCESS_LINE).as_deref(), Some("35"));

        let whole = compile(ExtractSpec::Regex {
            pattern: r"status=\d+".to_owned(),
            group: None,
        });
        assert_eq!(whole.extract(ACCESS_LINE).as_deref(), Some("status=200"));
    }

    #[test]
    fn regex_compile_errors() {
        assert!(
            Extractor::compile(&ExtractSpec::Regex {
                pattern: "(unclosed".to_owned(),
                group: None,
            })
            .is_err()
        );
        assert!(
            Extractor::compile(&ExtractSpec::Regex {
                pattern: r"(\d+)".to_owned(),
                group: Some("missing".to_owned()),
            })
            .is_err()
        );
    }

    #[test]
    fn first_path_token() {
        let ex = compile(ExtractSpec::FirstPath);
        assert_eq!(ex.extract(ACCESS_LINE).as_deref(), Some("/api/orders"));
        assert_eq!(
            ex.extract(r#"127.0.0.1 "GET /health" 200"#).as_deref(),
            Some("/health")
        );
        assert_eq!(ex.extract("see http://host/x"), None);
        assert_eq!(ex.extract("no path here"), None);
    }

    #[test]
    fn key_value_digits() {
        let ex = compile(ExtractSpec::KeyValue {
            key: "status".to_owned(),
            digits: true,
        });
        assert_eq!(ex.extract(ACCESS_LINE).as_deref(), Some("200"));
        assert_eq!(ex.extract("status=abc"), None);
        assert_eq!(ex.extract("http_status=500 status=404").as_deref(), Some("404"));
    }

    #[test]
    fn key_value_text() {
        let ex = compile(ExtractSpec::KeyValue {
            key: "user".to_owned(),
            digits: false,
        });
        assert_eq!(ex.extract("login user=alice,ok").as_deref(), Some("alice"));
        assert_eq!(ex.extract(r#"user="bob" ip=1"#).as_deref(), Some("bob"));
        assert_eq!(ex.extract("user="), None);
    }

    #[test]
    fn key_value_rejects_bad_key() {
        assert!(
            Extractor::compile(&ExtractSpec::KeyValue {
                key: "a b".to_owned(),
                digits: false,
            })
            .is_err()
        );
    }

    #[test]
    fn bracket_tag() {
        let ex = compile(ExtractSpec::BracketTag);
        assert_eq!(
            ex.extract("[ORDER] Payment failed").as_deref(),
            Some("ORDER")
        );
        assert_eq!(ex.extract("  [ PAY ] x").as_deref(), Some("PAY"));
        assert_eq!(ex.extract("Order [ORDER]"), None);
        assert_eq!(ex.extract("[] empty"), None);
        assert_eq!(ex.extract("[unterminated"), None);
    }

    #[test]
    fn level_token() {
        let ex = compile(ExtractSpec::Level);
        assert_eq!(ex.extract(ACCESS_LINE).as_deref(), Some("INFO"));
        assert_eq!(ex.extract("2024 WARNING: disk").as_deref(), Some("WARN"));
        assert_eq!(ex.extract("ERRORS happened"), None);
        assert_eq!(ex.extract("error lowercase"), None);
    }

    #[test]
    fn extractor_set_only_returns_matches() {
        let mut specs = BTreeMap::new();
        specs.insert("path".to_owned(), ExtractSpec::FirstPath);
        specs.insert(
            "status".to_owned(),
            ExtractSpec::KeyValue {
                key: "status".to_owned(),
                digits: true,
            },
        );
        specs.insert("category".to_owned(), ExtractSpec::BracketTag);
        let set = ExtractorSet::compile(&specs).unwrap();
        assert_eq!(set.len(), 3);

        let out = set.extract(ACCESS_LINE);
        assert_eq!(out.get("path").map(String::as_str), Some("/api/orders"));
        assert_eq!(out.get("status").map(String::as_str), Some("200"));
        assert!(!out.contains_key("category"));
    }

    #[test]
    fn spec_deserializes_from_yaml() {
        let yaml = r#"
path: first_path
status:
  key_value: { key: status, digits: true }
endpoint:
  regex: { pattern: 'GET (\S+)' }
"#;
        let specs: BTreeMap<String, ExtractSpec> = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(yaml),
        )
        .unwrap();
        assert_eq!(specs["path"], ExtractSpec::FirstPath);
        assert!(matches!(
            specs["status"],
            ExtractSpec::KeyValue { digits: true, .. }
        ));
        assert!(matches!(specs["endpoint"], ExtractSpec::Regex { .. }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn all_extractors() -> Vec<Extractor> {
            vec![
                compile(ExtractSpec::FirstPath),
                compile(ExtractSpec::KeyValue {
                    key: "status".to_owned(),
                    digits: true,
                }),
                compile(ExtractSpec::KeyValue {
                    key: "user".to_owned(),
                    digits: false,
                }),
                compile(ExtractSpec::BracketTag),
                compile(ExtractSpec::Level),
                compile(ExtractSpec::Regex {
                    pattern: r"(\d+)".to_owned(),
                    group: None,
                }),
            ]
        }

        proptest! {
            #[test]
            fn extraction_is_total_and_deterministic(text in "\\PC{0,200}") {
                for ex in all_extractors() {
                    let first = ex.extract(&text);
                    let second = ex.extract(&text);
                    prop_assert_eq!(first, second);
                }
            }

            #[test]
            fn key_value_digits_are_numeric(text in "[a-z= 0-9,;]{0,60}") {
                let ex = compile(ExtractSpec::KeyValue {
                    key: "status".to_owned(),
                    digits: true,
                });
                if let Some(value) = ex.extract(&text) {
                    prop_assert!(!value.is_empty());
                    prop_assert!(value.chars().all(|c| c.is_ascii_digit()));
                }
            }
        }
    }
}
