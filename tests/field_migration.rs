use serde_json::json;
use typewright::construct::TypeHandle;
use typewright::conversion::ConversionResult;
use typewright::database::{Database, MAIN_STORE};
use typewright::persist::PersistenceMode;

fn named_struct(db: &mut Database, name: &str) -> TypeHandle {
    let handle = db.add_struct().expect("struct");
    db.set_type_name(handle, name).expect("type name");
    handle
}

fn add_field(db: &mut Database, record: TypeHandle, name: &str, type_text: &str) {
    let added = db.add_field(record).expect("field");
    db.set_field_name(record, &added, name).expect("field name");
    retype(db, record, name, type_text);
}

fn retype(db: &mut Database, record: TypeHandle, field: &str, type_text: &str) -> ConversionResult {
    let field_type = db.parse_type(type_text).expect("type");
    db.set_field_type(record, field, field_type).expect("field type")
}

fn point_with_origin(db: &mut Database) -> TypeHandle {
    let point = named_struct(db, "Point");
    add_field(db, point, "x", "f32");
    add_field(db, point, "y", "f32");
    let point_type = db.parse_type("Point").expect("type");
    db.add_root(MAIN_STORE, "origin", point_type).expect("root");
    point
}

fn origin(db: &Database) -> serde_json::Value {
    db.store(MAIN_STORE).unwrap().root("origin").unwrap().value.clone()
}

#[test]
fn float_to_integer_is_corrupted_and_migrates() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    assert_eq!(origin(&db), json!({"x": 0.0, "y": 0.0}));
    assert_eq!(retype(&mut db, point, "x", "i32"), ConversionResult::Corrupted);
    assert_eq!(origin(&db), json!({"x": 0, "y": 0.0}));
}

#[test]
fn values_follow_a_chain_of_type_changes() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    db.set_root_value(MAIN_STORE, "origin", json!({"x": 2.75, "y": 1.5}))
        .expect("value");

    assert_eq!(retype(&mut db, point, "x", "i32"), ConversionResult::Corrupted);
    assert_eq!(origin(&db)["x"], json!(2));
    assert_eq!(retype(&mut db, point, "x", "string"), ConversionResult::Corrupted);
    assert_eq!(origin(&db)["x"], json!("2"));
    assert_eq!(retype(&mut db, point, "x", "u8"), ConversionResult::Corrupted);
    assert_eq!(origin(&db)["x"], json!(2));
    assert_eq!(retype(&mut db, point, "x", "bytes"), ConversionResult::Lost);
    assert_eq!(origin(&db)["x"], json!([]));
    assert_eq!(retype(&mut db, point, "x", "void"), ConversionResult::Lost);
    assert_eq!(origin(&db)["x"], json!(null));
    // coming from void nothing can be lost
    assert_eq!(retype(&mut db, point, "x", "f64"), ConversionResult::Preserved);
    assert_eq!(origin(&db), json!({"x": 0.0, "y": 1.5}));
}

#[test]
fn switching_to_a_record_type_is_impossible_but_defaulted() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    let size = named_struct(&mut db, "Size");
    add_field(&mut db, size, "w", "u32");
    db.set_root_value(MAIN_STORE, "origin", json!({"x": 4.0, "y": 1.0}))
        .expect("value");
    assert_eq!(retype(&mut db, point, "x", "Size"), ConversionResult::Impossible);
    assert_eq!(origin(&db), json!({"x": {"w": 0}, "y": 1.0}));
    let record = db.ledger().last().expect("record");
    assert_eq!(record.params["result"], json!("Impossible"));
    assert_eq!(record.params["backup"][0]["value"], json!(4.0));
}

#[test]
fn previewing_a_type_change_touches_nothing() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    let changes = db.ledger().len();
    let target = db.parse_type("string").expect("type");
    let preview = db
        .classify_field_type_change(point, "x", &target)
        .expect("preview");
    assert_eq!(preview, ConversionResult::Corrupted);
    assert_eq!(db.ledger().len(), changes);
    assert_eq!(origin(&db)["x"], json!(0.0));
    let same = db.parse_type("f32").expect("type");
    assert_eq!(
        db.classify_field_type_change(point, "x", &same).expect("preview"),
        ConversionResult::Preserved
    );
}

#[test]
fn nested_objects_are_migrated_too() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = named_struct(&mut db, "Point");
    add_field(&mut db, point, "x", "f32");
    let shape = named_struct(&mut db, "Shape");
    add_field(&mut db, shape, "points", "list<Point>");
    let shape_type = db.parse_type("Shape").expect("type");
    db.add_root(MAIN_STORE, "triangle", shape_type).expect("root");
    db.set_root_value(
        MAIN_STORE,
        "triangle",
        json!({"points": [{"x": 1.5}, {"x": 2.5}, {"x": -3.5}]}),
    )
    .expect("value");

    db.set_field_name(point, "x", "px").expect("rename");
    retype(&mut db, point, "px", "i16");
    let triangle = &db.store(MAIN_STORE).unwrap().root("triangle").unwrap().value;
    assert_eq!(triangle, &json!({"points": [{"px": 1}, {"px": 2}, {"px": -3}]}));
    assert_eq!(db.ledger().last().unwrap().params["migrated"], json!(3));
}

#[test]
fn added_fields_appear_in_stored_objects() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    add_field(&mut db, point, "label", "string");
    assert_eq!(origin(&db), json!({"x": 0.0, "y": 0.0, "label": ""}));
    db.swap_fields(point, 0, 2).expect("swap");
    let keys: Vec<String> = origin(&db).as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["label", "y", "x"]);
    let err = db.swap_fields(point, 0, 3).unwrap_err();
    assert!(err.to_string().contains("no field at position 3"));
}

#[test]
fn deleted_fields_are_backed_up() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    db.set_root_value(MAIN_STORE, "origin", json!({"x": 1.0, "y": 2.0}))
        .expect("value");
    db.delete_field(point, "y").expect("delete");
    assert_eq!(origin(&db), json!({"x": 1.0}));
    let record = db.ledger().last().expect("record");
    assert_eq!(record.action, "delete_field");
    assert_eq!(record.params["type"], json!("f32"));
    assert_eq!(record.params["backup"][0]["field"], json!("y"));
    assert_eq!(record.params["backup"][0]["value"], json!(2.0));
}

#[test]
fn rejected_changes_leave_no_trace() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = point_with_origin(&mut db);
    let changes = db.ledger().len();
    let before = origin(&db);
    let recursive = db.parse_type("list<Point>").expect("type");
    assert!(db.set_field_type(point, "x", recursive).is_err());
    assert!(db.set_field_name(point, "x", "y").is_err());
    assert!(db.delete_field(point, "z").is_err());
    assert!(db.set_root_value(MAIN_STORE, "origin", json!({"x": "one", "y": 0.0})).is_err());
    assert_eq!(db.ledger().len(), changes);
    assert_eq!(origin(&db), before);
}
