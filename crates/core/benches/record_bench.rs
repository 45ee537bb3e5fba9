//! 레코드 벤치마크
//!
//! Record 생성, 필드 조작, 직렬화, 채널 통신 성능을 측정합니다.

use std::collections::BTreeMap;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use logroute_core::types::{FieldValue, Record};

fn create_fields() -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert(
        "log".to_owned(),
        FieldValue::from("[ORDER] Order created successfully"),
    );
    fields.insert("level".to_owned(), FieldValue::from("INFO"));
    fields.insert("order_id".to_owned(), FieldValue::from("ORD-12345"));
    fields.insert("status".to_owned(), FieldValue::Int(200));
    fields
}

fn bench_record_creation(c: &mut Criterion) {
    let fields = create_fields();

    let mut group = c.benchmark_group("record_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_new", |b| {
        b.iter(|| Record::new(black_box("order.log"), black_box(fields.clone())))
    });

    group.bench_function("record_clone", |b| {
        let record = Record::new("order.log", fields.clone());
        b.iter(|| black_box(&record).clone())
    });

    group.finish();
}

fn bench_field_access(c: &mut Criterion) {
    let mut record = Record::new("order.log", create_fields());

    let mut group = c.benchmark_group("field_access");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_str", |b| {
        b.iter(|| black_box(&record).get_str(black_box("level")).is_some())
    });

    group.bench_function("set_overwrite", |b| {
        b.iter(|| record.set(black_box("is_error"), black_box("false")))
    });

    group.bench_function("to_text_int", |b| {
        let value = FieldValue::Int(404);
        b.iter(|| black_box(&value).to_text())
    });

    group.finish();
}

fn bench_record_serialization(c: &mut Criterion) {
    let record = Record::new("order.log", create_fields());
    let json = serde_json::to_string(&record).unwrap();

    let mut group = c.benchmark_group("record_serialization");
    group.throughput(Throughput::Bytes(json.len() as u64));

    group.bench_function("to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&record)).unwrap())
    });

    group.bench_function("from_json", |b| {
        b.iter(|| serde_json::from_str::<Record>(black_box(&json)).unwrap())
    });

    group.finish();
}

fn bench_channel_throughput(c: &mut Criterion) {
    use tokio::runtime::Runtime;

    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("channel_throughput");

    group.throughput(Throughput::Elements(1000));
    group.bench_function("send_recv_1000_records", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, mut rx) = tokio::sync::mpsc::channel::<Record>(256);

                let sender = tokio::spawn(async move {
                    for _ in 0..1000 {
                        tx.send(Record::new("order.log", create_fields()))
                            .await
                            .unwrap();
                    }
                });

                let mut count = 0;
                while rx.recv().await.is_some() {
                    count += 1;
                }
                sender.await.unwrap();
                assert_eq!(count, 1000);
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record_creation,
    bench_field_access,
    bench_record_serialization,
    bench_channel_throughput
);
criterion_main!(benches);
