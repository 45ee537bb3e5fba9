//! 태그 매처 -- 태그 패턴으로 레코드의 대상 레이블을 결정합니다.
//!
//! 태그는 `.`으로 구분된 세그먼트입니다 (`order.log`, `app.fastapi.access`).
//!
//! # 패턴 문법
//! - `order.log`: 정확히 일치
//! - `*`: 세그먼트 하나와 일치
//! - `**`: 0개 이상의 세그먼트와 일치 (`order.**`는 `order`, `order.log`, `order.a.b`와 일치)
//! - `{a,b}`: 나열된 값 중 하나인 세그먼트와 일치
//!
//! # 우선순위
//! 첫 와일드카드 문자(`*`, `{`) 앞의 리터럴 접두어가 긴 패턴이 우선합니다.
//! 길이가 같으면 먼저 선언된 바인딩이 우선합니다.

use crate::error::EngineError;

/// 패턴 세그먼트
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    Any,
    /// `**`
    AnyDepth,
    /// `{a,b,c}`
    OneOf(Vec<String>),
}

/// 컴파일된 태그 패턴
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    raw: String,
    segments: Vec<Segment>,
    specificity: usize,
}

impl TagPattern {
    /// 패턴 문자열을 파싱합니다.
    pub fn parse(pattern: &str) -> Result<Self, EngineError> {
        let err = |reason: &str| EngineError::Pattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        if pattern.is_empty() {
            return Err(err("pattern must not be empty"));
        }

        let mut segments = Vec::new();
        for part in pattern.split('.') {
            let segment = match part {
                "" => return Err(err("empty segment")),
                "*" => Segment::Any,
                "**" => Segment::AnyDepth,
                _ if part.starts_with('{') && part.ends_with('}') => {
                    let inner = &part[1..part.len() - 1];
                    let options: Vec<String> =
                        inner.split(',').map(|s| s.trim().to_owned()).collect();
                    if options.iter().any(|o| o.is_empty() || !is_literal(o)) {
                        return Err(err("alternatives must be non-empty literals"));
                    }
                    Segment::OneOf(options)
                }
                _ if is_literal(part) => Segment::Literal(part.to_owned()),
                _ => return Err(err("wildcards must occupy a whole segment")),
            };
            segments.push(segment);
        }

        let specificity = pattern
            .find(|c| c == '*' || c == '{')
            .unwrap_or(pattern.len());

        Ok(Self {
            raw: pattern.to_owned(),
            segments,
            specificity,
        })
    }

    /// 원본 패턴 문자열
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 리터럴 접두어 길이 (우선순위 기준)
    pub fn specificity(&self) -> usize {
        self.specificity
    }

    /// 태그가 패턴과 일치하는지 확인합니다.
    pub fn matches(&self, tag: &str) -> bool {
        if tag.is_empty() {
            return false;
        }
        let parts: Vec<&str> = tag.split('.').collect();
        match_segments(&self.segments, &parts)
    }
}

fn is_literal(s: &str) -> bool {
    !s.contains(['*', '{', '}', ','])
}

fn match_segments(pattern: &[Segment], tag: &[&str]) -> bool {
    match pattern.split_first() {
        None => tag.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=tag.len()).any(|skip| match_segments(rest, &tag[skip..]))
        }
        Some((segment, rest)) => match tag.split_first() {
            None => false,
            Some((head, tail)) => {
                let hit = match segment {
                    Segment::Literal(lit) => lit == head,
                    Segment::Any => true,
                    Segment::OneOf(options) => options.iter().any(|o| o == head),
                    // 바깥 match에서 먼저 처리됨
                    Segment::AnyDepth => false,
                };
                hit && match_segments(rest, tail)
            }
        },
    }
}

/// 태그 패턴 → 대상 매처
///
/// 바인딩은 생성 시 (우선순위 내림차순, 선언 순서 오름차순)으로 정렬되며,
/// 조회는 첫 번째로 일치하는 바인딩을 반환합니다.
#[derive(Debug, Clone)]
pub struct TagMatcher<T> {
    bindings: Vec<(TagPattern, T)>,
}

impl<T> TagMatcher<T> {
    /// 선언 순서대로 나열된 바인딩으로 매처를 생성합니다.
    pub fn new(bindings: Vec<(TagPattern, T)>) -> Self {
        let mut bindings = bindings;
        // sort_by는 안정 정렬이므로 같은 우선순위는 선언 순서 유지
        bindings.sort_by(|(a, _), (b, _)| b.specificity().cmp(&a.specificity()));
        Self { bindings }
    }

    /// 태그와 일치하는 대상을 반환합니다.
    pub fn resolve(&self, tag: &str) -> Option<&T> {
        self.bindings
            .iter()
            .find(|(pattern, _)| pattern.matches(tag))
            .map(|(_, target)| target)
    }

    /// 태그와 일치하는 패턴과 대상을 반환합니다 (진단용).
    pub fn resolve_with_pattern(&self, tag: &str) -> Option<(&TagPattern, &T)> {
        self.bindings
            .iter()
            .find(|(pattern, _)| pattern.matches(tag))
            .map(|(pattern, target)| (pattern, target))
    }

    /// 바인딩 수
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 바인딩이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
