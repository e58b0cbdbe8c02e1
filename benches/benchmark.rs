use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;

use typewright::conversion::convert;
use typewright::database::Database;
use typewright::datatype::{initialize, visit};
use typewright::order::order;
use typewright::persist::PersistenceMode;
use typewright::validate::{validate_field_type, validate_identifier};

// A chain of structs, each holding the previous one by value.
fn chain(length: usize) -> Database {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let mut previous = None;
    for _ in 0..length {
        let record = db.add_struct().expect("struct");
        let field = db.add_field(record).expect("field");
        let text = match previous {
            Some(previous) => format!("list<{}>", db.registry().name_of(previous)),
            None => "i32".to_string(),
        };
        let field_type = db.parse_type(&text).expect("type");
        db.set_field_type(record, &field, field_type).expect("field type");
        previous = Some(record);
    }
    db
}

fn identifiers(c: &mut Criterion) {
    c.bench_function("validate_identifier", |b| {
        b.iter(|| {
            for name in ["Point", "_private", "class", "a__b", "x1"] {
                let _ = black_box(validate_identifier(black_box(name)));
            }
        })
    });
}

fn completeness(c: &mut Criterion) {
    let db = chain(50);
    let last = *db.registry().user_types().last().expect("types");
    let candidate = db.parse_type("map<string,list<Struct25>>").expect("type");
    c.bench_function("validate_field_type deep", |b| {
        b.iter(|| black_box(validate_field_type(db.registry(), last, Some(&candidate)).is_ok()))
    });
}

fn ordering(c: &mut Criterion) {
    let db = chain(200);
    let mut types = db.registry().user_types();
    types.reverse();
    c.bench_function("order 200 types", |b| b.iter(|| black_box(order(db.registry(), &types))));
}

fn values(c: &mut Criterion) {
    let db = chain(1);
    let registry = db.registry();
    let grid = db.parse_type("array<array<f64,32>,32>").expect("type");
    let value = initialize(registry, &grid);
    c.bench_function("initialize 32x32", |b| b.iter(|| black_box(initialize(registry, &grid))));
    c.bench_function("visit 32x32", |b| {
        b.iter(|| {
            let mut count = 0;
            visit(registry, &grid, &value, &mut |_, _, _| {
                count += 1;
                false
            });
            black_box(count)
        })
    });
    let from = db.parse_type("f64").expect("type");
    let to = db.parse_type("i16").expect("type");
    c.bench_function("convert f64 to i16", |b| {
        b.iter(|| {
            let mut slot = json!(1234.5);
            black_box(convert(registry, &from, &to, &mut slot))
        })
    });
}

criterion_group!(benches, identifiers, completeness, ordering, values);
criterion_main!(benches);
