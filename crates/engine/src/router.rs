//! 라우터 -- 레이블 그래프 위의 레코드 상태 기계
//!
//! ```text
//!  ingest(tag) ──► resolve ──► [label stages...] ──► output? ──► Delivered
//!                    │              │    │
//!                    │ no route     │    └─ reroute (hops += 1) ──► label'
//!                    ▼              ▼ filter
//!                 Dropped        Dropped
//! ```
//!
//! 라우터는 순수합니다. 공유 상태를 변경하지 않고 레코드 하나를 받아
//! 종착 상태([`RouteOutcome`]) 하나를 반환하므로 여러 태스크에서 동시에 호출할 수 있습니다.
//! 재라우팅 횟수는 `max_hops`로 제한되어 설정상의 순환이 있어도 항상 종료합니다.

use std::fmt;
use std::sync::Arc;

use logroute_core::types::Record;

use crate::label::{LabelGraph, LabelId, OutputId};
use crate::stage::{Reroute, StageOutcome};

/// 드롭 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// 필터 스테이지에 의해 제외됨
    FilteredOut,
    /// 일치하는 바인딩도 기본 레이블도 없음
    NoRoute,
    /// 재라우팅 횟수 초과 (설정 결함)
    HopLimit,
    /// 스테이지 끝에 도달했으나 출력이 없음
    NoOutput,
}

impl DropReason {
    /// 메트릭 레이블 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilteredOut => "filtered_out",
            Self::NoRoute => "no_route",
            Self::HopLimit => "hop_limit",
            Self::NoOutput => "no_output",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 라우팅 종착 상태
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// 출력으로 전달할 레코드
    Delivered {
        /// 마지막 레이블
        label: LabelId,
        /// 전달 대상 출력
        output: OutputId,
        /// 변환이 적용된 레코드
        record: Record,
        /// 재라우팅 횟수
        hops: u32,
    },
    /// 드롭
    Dropped {
        /// 사유
        reason: DropReason,
        /// 드롭 시점의 레이블 (`NoRoute`는 없음)
        label: Option<LabelId>,
    },
}

impl RouteOutcome {
    /// 전달 여부
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// 레코드 라우터
#[derive(Debug, Clone)]
pub struct Router {
    graph: Arc<LabelGraph>,
    max_hops: u32,
}

impl Router {
    /// 새 라우터를 생성합니다.
    pub fn new(graph: Arc<LabelGraph>, max_hops: u32) -> Self {
        Self { graph, max_hops }
    }

    /// 레이블 그래프
    pub fn graph(&self) -> &LabelGraph {
        &self.graph
    }

    /// 레코드를 현재 태그에서 시작하여 종착 상태까지 라우팅합니다.
    pub fn route(&self, record: Record) -> RouteOutcome {
        match self.graph.resolve(&record.tag) {
            Some(label) => self.route_from(label, record),
            None => {
                tracing::debug!(tag = %record.tag, record_id = %record.id, "no route for tag");
                RouteOutcome::Dropped {
                    reason: DropReason::NoRoute,
                    label: None,
                }
            }
        }
    }

    /// 지정한 레이블에서 시작하여 라우팅합니다.
    pub fn route_from(&self, start: LabelId, mut record: Record) -> RouteOutcome {
        let mut current = start;
        let mut hops: u32 = 0;

        'labels: loop {
            let label = self.graph.label(current);

            for stage in &label.stages {
                match stage.run(&mut record) {
                    StageOutcome::Continue => {}
                    StageOutcome::Drop => {
                        tracing::debug!(
                            label = %label.name,
                            record_id = %record.id,
                            "record filtered out"
                        );
                        return RouteOutcome::Dropped {
                            reason: DropReason::FilteredOut,
                            label: Some(current),
                        };
                    }
                    StageOutcome::Reroute(reroute) => {
                        hops += 1;
                        if hops > self.max_hops {
                            tracing::warn!(
                                label = %label.name,
                                tag = %record.tag,
                                max_hops = self.max_hops,
                                "reroute hop limit exceeded, dropping record (routing loop in pipeline definition?)"
                            );
                            return RouteOutcome::Dropped {
                                reason: DropReason::HopLimit,
                                label: Some(current),
                            };
                        }

                        match self.next_label(reroute, &mut record) {
                            Some(next) => {
                                tracing::trace!(
                                    from = %label.name,
                                    to = %self.graph.label_name(next),
                                    hops,
                                    "record rerouted"
                                );
                                current = next;
                                continue 'labels;
                            }
                            None => {
                                tracing::debug!(
                                    tag = %record.tag,
                                    record_id = %record.id,
                                    "no route for rewritten tag"
                                );
                                return RouteOutcome::Dropped {
                                    reason: DropReason::NoRoute,
                                    label: Some(current),
                                };
                            }
                        }
                    }
                }
            }

            return match label.output {
                Some(output) => RouteOutcome::Delivered {
                    label: current,
                    output,
                    record,
                    hops,
                },
                None => {
                    tracing::debug!(label = %label.name, record_id = %record.id, "label has no output");
                    RouteOutcome::Dropped {
                        reason: DropReason::NoOutput,
                        label: Some(current),
                    }
                }
            };
        }
    }

    /// 재라우팅 지시를 적용하고 다음 레이블을 결정합니다.
    fn next_label(&self, reroute: Reroute, record: &mut Record) -> Option<LabelId> {
        if let Some(tag) = reroute.tag {
            record.tag = tag;
        }
        match reroute.label {
            Some(label) => Some(label),
            None => self.graph.resolve(&record.tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::PipelineFile;

    fn router(yaml: &str, default_label: Option<&str>, max_hops: u32) -> Router {
        let file: PipelineFile = serde_yaml::from_str(yaml).unwrap();
        let graph = LabelGraph::compile(&file, default_label).unwrap();
        Router::new(Arc::new(graph), max_hops)
    }

    const SPLIT: &str = r#"
bindings:
  - { pattern: "order.**", label: ORDER_APP }
labels:
  - name: ORDER_APP
    stages:
      - transform:
          set:
            - field: should_route_to_error
              expr:
                if:
                  cond: { equals: { of: { field: level }, value: ERROR } }
                  then: "true"
                  else: "false"
              default: "false"
          reroute:
            - when: { equals: { of: { field: should_route_to_error }, value: "true" } }
              label: ORDER_APP_ERRORS
            - when: true
              label: ORDER_APP_NORMAL
  - name: ORDER_APP_NORMAL
    stages:
      - filter: { conditions: [ { key: should_route_to_error, pattern: '^false$' } ] }
    output: normal
  - name: ORDER_APP_ERRORS
    stages:
      - filter: { conditions: [ { key: should_route_to_error, pattern: '^true$' } ] }
      - transform: { set: [ { field: alert_priority, value: HIGH } ] }
    output: errors
outputs:
  - { name: normal, type: memory }
  - { name: errors, type: memory }
"#;

    #[test]
    fn routes_to_sibling_labels() {
        let r = router(SPLIT, None, 8);

        let info = Record::empty("order.log").with_field("level", "INFO");
        match r.route(info) {
            RouteOutcome::Delivered {
                label, hops, record, ..
            } => {
                assert_eq!(r.graph().label_name(label), "ORDER_APP_NORMAL");
                assert_eq!(hops, 1);
                assert!(record.get("alert_priority").is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let error = Record::empty("order.log").with_field("level", "ERROR");
        match r.route(error) {
            RouteOutcome::Delivered { label, record, .. } => {
                assert_eq!(r.graph().label_name(label), "ORDER_APP_ERRORS");
                assert_eq!(record.get_str("alert_priority"), Some("HIGH"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unbound_tag_without_default_is_no_route() {
        let r = router(SPLIT, None, 8);
        assert_eq!(
            r.route(Record::empty("user.log")),
            RouteOutcome::Dropped {
                reason: DropReason::NoRoute,
                label: None
            }
        );
    }

    #[test]
    fn filter_drop_is_terminal() {
        let yaml = r#"
bindings: [ { pattern: "**", label: A } ]
labels:
  - name: A
    stages:
      - filter: { conditions: [ { key: keep, pattern: yes } ] }
      - transform: { set: [ { field: touched, value: true } ] }
    output: o
outputs: [ { name: o, type: memory } ]
"#;
        let r = router(yaml, None, 8);
        let outcome = r.route(Record::empty("x"));
        assert!(matches!(
            outcome,
            RouteOutcome::Dropped {
                reason: DropReason::FilteredOut,
                ..
            }
        ));
    }

    #[test]
    fn label_without_output_drops_at_end() {
        let yaml = r#"
bindings: [ { pattern: "**", label: A } ]
labels: [ { name: A } ]
"#;
        let r = router(yaml, None, 8);
        assert!(matches!(
            r.route(Record::empty("x")),
            RouteOutcome::Dropped {
                reason: DropReason::NoOutput,
                ..
            }
        ));
    }

    const LOOP: &str = r#"
bindings: [ { pattern: "loop.*", label: PING } ]
labels:
  - name: PING
    stages:
      - transform: { reroute: [ { when: true, label: PONG } ] }
  - name: PONG
    stages:
      - transform: { reroute: [ { when: true, tag: loop.again } ] }
"#;

    #[test]
    fn routing_loop_hits_hop_limit() {
        let r = router(LOOP, None, 8);
        assert!(matches!(
            r.route(Record::empty("loop.start")),
            RouteOutcome::Dropped {
                reason: DropReason::HopLimit,
                ..
            }
        ));
    }

    #[test]
    fn tag_reroute_rewrites_tag_and_rematches() {
        let yaml = r#"
bindings:
  - { pattern: "raw.**", label: RAW }
  - { pattern: "clean.**", label: CLEAN }
labels:
  - name: RAW
    stages:
      - transform: { reroute: [ { when: true, tag: clean.order } ] }
  - name: CLEAN
    output: o
outputs: [ { name: o, type: memory } ]
"#;
        let r = router(yaml, None, 8);
        match r.route(Record::empty("raw.order")) {
            RouteOutcome::Delivered { record, label, .. } => {
                assert_eq!(record.tag, "clean.order");
                assert_eq!(r.graph().label_name(label), "CLEAN");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rewritten_tag_without_route_is_dropped() {
        let yaml = r#"
bindings: [ { pattern: "raw.**", label: RAW } ]
labels:
  - name: RAW
    stages:
      - transform: { reroute: [ { when: true, tag: nowhere } ] }
"#;
        let r = router(yaml, None, 8);
        assert!(matches!(
            r.route(Record::empty("raw.x")),
            RouteOutcome::Dropped {
                reason: DropReason::NoRoute,
                label: Some(_)
            }
        ));
    }

    #[test]
    fn hop_limit_is_exact() {
        // L0 → L1 → L2: 재라우팅 2회. max_hops와 같으면 허용
        let yaml = r#"
bindings: [ { pattern: "**", label: L0 } ]
labels:
  - name: L0
    stages: [ { transform: { reroute: [ { when: true, label: L1 } ] } } ]
  - name: L1
    stages: [ { transform: { reroute: [ { when: true, label: L2 } ] } } ]
  - name: L2
    output: o
outputs: [ { name: o, type: memory } ]
"#;
        assert!(router(yaml, None, 2).route(Record::empty("x")).is_delivered());
        assert!(!router(yaml, None, 1).route(Record::empty("x")).is_delivered());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn routing_always_terminates(
                tag in "(loop|order|x)(\\.[a-z]{1,4}){0,2}",
                max_hops in 0u32..16,
                level in prop::sample::select(vec!["INFO", "ERROR", ""]),
            ) {
                for yaml in [LOOP, SPLIT] {
                    let r = router(yaml, None, max_hops);
                    let record = Record::empty(tag.as_str()).with_field("level", level);
                    match r.route(record) {
                        RouteOutcome::Delivered { hops, .. } => prop_assert!(hops <= max_hops),
                        RouteOutcome::Dropped { .. } => {}
                    }
                }
            }
        }
    }
}
