use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use decom::packet::{decode_records, Outcome};
use decom::schema::PacketSchema;

fn schema() -> PacketSchema {
    PacketSchema::from_str(
        r#"{
  "containers": [
    {
      "name": "SCIENCE",
      "restrictions": [{"field": "APID", "value": 779}],
      "fields": [
        {"name": "VERSION", "kind": {"type": "uint", "bits": 3}},
        {"name": "TYPE", "kind": {"type": "uint", "bits": 1}},
        {"name": "SEC_HDR_FLG", "kind": {"type": "uint", "bits": 1}},
        {"name": "APID", "kind": {"type": "uint", "bits": 11}},
        {"name": "SEQ_FLGS", "kind": {"type": "uint", "bits": 2}},
        {"name": "SEQ_CTR", "kind": {"type": "uint", "bits": 14}},
        {"name": "LEN", "kind": {"type": "uint", "bits": 16}},
        {"name": "COUNT", "kind": {"type": "uint", "bits": 8}},
        {"name": "SAMPLES", "kind": {"type": "bytes", "len": {"octetsFrom": "COUNT"}}}
      ]
    }
  ]
}"#,
    )
    .unwrap()
}

// A stream of 1000 small science packets.
fn stream() -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();

    let mut dat = Vec::new();
    for seq in 0..1000u16 {
        dat.extend(779u16.to_be_bytes());
        dat.extend((0xc000 | seq).to_be_bytes());
        dat.extend(16u16.to_be_bytes()); // 17 body octets
        dat.push(16); // count
        for _ in 0..16 {
            dat.push(rng.gen());
        }
    }
    dat
}

fn bench_decode_stream(c: &mut Criterion) {
    let schema = schema();
    let dat = stream();

    let mut group = c.benchmark_group("packet");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("decode_stream", |b| {
        b.iter(|| {
            let count = decode_records(&schema, &dat)
                .filter(|z| matches!(z, Ok(Outcome::Record(_))))
                .count();
            assert_eq!(count, 1000);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode_stream);
criterion_main!(benches);
