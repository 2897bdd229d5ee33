use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use rowforge_core::config::GeneratorConfig;
use rowforge_core::generate::generate_value;
use rowforge_core::schema::Field;

fn field(name: &str, data_type: &str) -> Field {
    Field {
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        char_max_length: Some(255),
        numeric_precision: Some(10),
        ..Field::default()
    }
}

fn bench_generators(c: &mut Criterion) {
    let config = GeneratorConfig::default();
    let mut rng = StdRng::seed_from_u64(42);

    let int_field = field("n", "bigint");
    c.bench_function("generate_bigint", |b| {
        b.iter(|| black_box(generate_value(&int_field, &config, &mut rng).unwrap()))
    });

    let email_field = field("email", "varchar");
    c.bench_function("generate_email", |b| {
        b.iter(|| black_box(generate_value(&email_field, &config, &mut rng).unwrap()))
    });

    let token_field = field("opaque", "varchar");
    c.bench_function("generate_token", |b| {
        b.iter(|| black_box(generate_value(&token_field, &config, &mut rng).unwrap()))
    });

    let ts_field = field("created_at", "timestamp");
    c.bench_function("generate_timestamp", |b| {
        b.iter(|| black_box(generate_value(&ts_field, &config, &mut rng).unwrap()))
    });
}

criterion_group!(benches, bench_generators);
criterion_main!(benches);
