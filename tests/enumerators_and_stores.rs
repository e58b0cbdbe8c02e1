use serde_json::json;
use typewright::construct::{FieldFlags, TypeHandle};
use typewright::database::{Database, MAIN_STORE};
use typewright::persist::PersistenceMode;

fn add_field(db: &mut Database, record: TypeHandle, name: &str, type_text: &str) {
    let added = db.add_field(record).expect("field");
    db.set_field_name(record, &added, name).expect("field name");
    let field_type = db.parse_type(type_text).expect("type");
    db.set_field_type(record, name, field_type).expect("field type");
}

fn enum_values(db: &Database, enumeration: TypeHandle) -> Vec<i64> {
    db.registry()
        .get(enumeration)
        .and_then(|definition| definition.enumeration())
        .map(|body| body.values())
        .unwrap_or_default()
}

fn stored(db: &Database, root: &str) -> serde_json::Value {
    db.store(MAIN_STORE).unwrap().root(root).unwrap().value.clone()
}

#[test]
fn enumerators_get_fresh_names_and_implicit_values() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let level = db.add_enum().expect("enum");
    let names: Vec<String> = (0..3).map(|_| db.add_enumerator(level).expect("enumerator")).collect();
    assert_eq!(names, ["Value1", "Value2", "Value3"]);
    assert_eq!(enum_values(&db, level), vec![0, 1, 2]);
    let err = db.set_enumerator_name(level, 2, "Value1").unwrap_err();
    assert!(err.to_string().contains("already has an enumerator named 'Value1'"));
    db.set_enumerator_name(level, 0, "Low").expect("rename");
    let err = db.set_enumerator_name(level, 7, "High").unwrap_err();
    assert!(err.to_string().contains("no enumerator at position 7"));
}

#[test]
fn stored_enum_values_are_renumbered() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let level = db.add_enum().expect("enum");
    for _ in 0..3 {
        db.add_enumerator(level).expect("enumerator");
    }
    let level_type = db.parse_type("Enum1").expect("type");
    db.add_root(MAIN_STORE, "middle", level_type.clone()).expect("root");
    db.add_root(MAIN_STORE, "last", level_type).expect("root");
    db.set_root_value(MAIN_STORE, "middle", json!(1)).expect("value");
    db.set_root_value(MAIN_STORE, "last", json!(2)).expect("value");

    db.set_enumerator_value(level, 1, Some(10)).expect("value");
    assert_eq!(enum_values(&db, level), vec![0, 10, 11]);
    assert_eq!(stored(&db, "middle"), json!(10));
    assert_eq!(stored(&db, "last"), json!(11));

    db.delete_enumerator(level, 1).expect("delete");
    assert_eq!(enum_values(&db, level), vec![0, 1]);
    assert_eq!(stored(&db, "middle"), json!(0));
    assert_eq!(stored(&db, "last"), json!(1));
    assert_eq!(db.ledger().last().unwrap().params["enumerator"]["name"], json!("Value2"));
}

#[test]
fn unique_and_indexed_need_a_table_struct() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let row = db.add_struct().expect("struct");
    add_field(&mut db, row, "id", "i32");
    add_field(&mut db, row, "tags", "list<i32>");
    let err = db.set_field_flags(row, "id", FieldFlags::UNIQUE).unwrap_err();
    assert!(err.to_string().contains("table structs"));

    db.set_record_table(row, true).expect("table");
    db.set_field_flags(row, "id", FieldFlags::UNIQUE | FieldFlags::INDEXED)
        .expect("unique");
    let err = db.set_field_flags(row, "tags", FieldFlags::INDEXED).unwrap_err();
    assert!(err.to_string().contains("need a scalar type"));
    let list = db.parse_type("list<i32>").expect("type");
    assert!(db.set_field_type(row, "id", list).is_err());
    let err = db.set_record_table(row, false).unwrap_err();
    assert!(err.to_string().contains("Field 'id'"), "{}", err);

    let class = db.add_class().expect("class");
    let err = db.set_record_table(class, true).unwrap_err();
    assert!(err.to_string().contains("Only structs"));
}

#[test]
fn access_flags_belong_to_classes() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let plain = db.add_struct().expect("struct");
    add_field(&mut db, plain, "x", "f32");
    let err = db.set_field_flags(plain, "x", FieldFlags::PRIVATE).unwrap_err();
    assert!(err.to_string().contains("private access"));
    db.set_field_flags(plain, "x", FieldFlags::NO_EDIT | FieldFlags::TRANSIENT)
        .expect("hints are fine anywhere");

    let class = db.add_class().expect("class");
    add_field(&mut db, class, "secret", "string");
    let err = db.set_field_flags(class, "secret", FieldFlags::GETTER).unwrap_err();
    assert!(err.to_string().contains("private field"));
    db.set_field_flags(class, "secret", FieldFlags::PRIVATE | FieldFlags::GETTER | FieldFlags::SETTER)
        .expect("accessors");
    let flags = db.registry().get(class).unwrap().record().unwrap().fields[0].flags;
    assert!(flags.contains(FieldFlags::GETTER));
}

#[test]
fn stores_and_roots_have_unique_names() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    assert!(db.store(MAIN_STORE).is_some());
    db.add_store("archive").expect("store");
    let err = db.add_store("archive").unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert!(db.add_store("not valid").is_err());

    let text = db.parse_type("string").expect("type");
    let err = db.add_root("missing", "r", text.clone()).unwrap_err();
    assert!(err.to_string().contains("no store named 'missing'"));
    db.add_root("archive", "note", text.clone()).expect("root");
    let err = db.add_root("archive", "note", text).unwrap_err();
    assert!(err.to_string().contains("already has a root named 'note'"));
    assert_eq!(db.store("archive").unwrap().root("note").unwrap().value, json!(""));

    db.set_root_value("archive", "note", json!("hello")).expect("value");
    assert_eq!(db.describe_root("archive", "note").as_deref(), Some("\"hello\""));
    let err = db.set_root_value("archive", "note", json!(5)).unwrap_err();
    assert!(err.to_string().contains("does not fit"));

    db.delete_root("archive", "note").expect("delete");
    assert!(db.store("archive").unwrap().is_empty());
    assert!(db.delete_root("archive", "note").is_err());
    assert_eq!(db.stores().count(), 2);
}
