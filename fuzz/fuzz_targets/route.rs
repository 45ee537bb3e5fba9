#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logroute_engine::decode::PayloadDecoder;
use logroute_engine::{LabelGraph, PipelineLoader, RouteOutcome, Router};

const PIPELINE: &str = include_str!("../../demos/conf.d/order-app.yml");
const MAX_HOPS: u32 = 8;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    tag: String,
    payload: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(file) = PipelineLoader::parse_yaml(PIPELINE, "order-app.yml") else {
        return;
    };
    let Ok(graph) = LabelGraph::compile(&file, None) else {
        return;
    };
    let router = Router::new(Arc::new(graph), MAX_HOPS);
    let record = PayloadDecoder::new(64 * 1024).decode(&input.tag, &input.payload).record;

    // 라우팅은 항상 종료하고 홉 제한을 넘지 않아야 함
    if let RouteOutcome::Delivered { hops, .. } = router.route(record) {
        assert!(hops <= MAX_HOPS);
    }
});
