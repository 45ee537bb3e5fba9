#![no_main]

use libfuzzer_sys::fuzz_target;
use logroute_engine::decode::PayloadDecoder;

fuzz_target!(|data: &[u8]| {
    // 디코더는 어떤 바이트열에도 레코드를 만들어야 함
    let decoder = PayloadDecoder::new(64 * 1024);
    let decoded = decoder.decode("fuzz.tag", data);
    assert_eq!(decoded.record.tag, "fuzz.tag");
    assert!(!decoded.record.id.is_empty());
});
