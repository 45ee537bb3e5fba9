#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logroute_engine::extract::{ExtractSpec, Extractor};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    spec: FuzzSpec,
    text: String,
}

#[derive(Arbitrary, Debug)]
enum FuzzSpec {
    Regex { pattern: String, group: Option<String> },
    FirstPath,
    KeyValue { key: String, digits: bool },
    BracketTag,
    Level,
}

impl From<FuzzSpec> for ExtractSpec {
    fn from(spec: FuzzSpec) -> Self {
        match spec {
            FuzzSpec::Regex { pattern, group } => ExtractSpec::Regex { pattern, group },
            FuzzSpec::FirstPath => ExtractSpec::FirstPath,
            FuzzSpec::KeyValue { key, digits } => ExtractSpec::KeyValue { key, digits },
            FuzzSpec::BracketTag => ExtractSpec::BracketTag,
            FuzzSpec::Level => ExtractSpec::Level,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 컴파일 실패(잘못된 정규식 등)는 허용, 추출은 패닉 없이 끝나야 함
    let Ok(extractor) = Extractor::compile(&input.spec.into()) else {
        return;
    };
    let _ = extractor.extract(&input.text);
});
