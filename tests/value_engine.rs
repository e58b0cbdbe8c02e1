use serde_json::{Value, json};
use typewright::construct::{BuiltinKind, TypeHandle, TypeReference};
use typewright::conversion::{ConversionResult, classify, convert};
use typewright::database::{Database, MAIN_STORE};
use typewright::datatype::{ValuePath, conforms, initialize, visit};
use typewright::error::TypewrightError;
use typewright::persist::PersistenceMode;
use typewright::validate::{MAX_ARRAY_SIZE, MAX_DEFAULT_VALUES};

fn named_struct(db: &mut Database, name: &str) -> TypeHandle {
    let handle = db.add_struct().expect("struct");
    db.set_type_name(handle, name).expect("type name");
    handle
}

fn add_field(db: &mut Database, record: TypeHandle, name: &str, type_text: &str) {
    let added = db.add_field(record).expect("field");
    db.set_field_name(record, &added, name).expect("field name");
    let field_type = db.parse_type(type_text).expect("type");
    db.set_field_type(record, name, field_type).expect("field type");
}

fn default_of(db: &Database, type_text: &str) -> Value {
    let reference = db.parse_type(type_text).expect("type");
    initialize(db.registry(), &reference)
}

#[test]
fn built_in_defaults() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    assert_eq!(default_of(&db, "array<i32,4>"), json!([0, 0, 0, 0]));
    assert_eq!(default_of(&db, "variant<i32,string>"), json!([0, 0]));
    assert_eq!(default_of(&db, "map<string,f32>"), json!([]));
    assert_eq!(default_of(&db, "vec3"), json!([0.0, 0.0, 0.0]));
    assert_eq!(default_of(&db, "bvec2"), json!([false, false]));
    assert_eq!(default_of(&db, "own<string>"), json!(null));
    assert_eq!(default_of(&db, "array<array<bool,2>,2>"), json!([[false, false], [false, false]]));
    for text in ["array<i32,4>", "variant<i32,string>", "vec3", "own<string>", "json", "bytes"] {
        let reference = db.parse_type(text).expect("type");
        assert!(conforms(db.registry(), &reference, &initialize(db.registry(), &reference)), "{}", text);
    }
}

#[test]
fn record_defaults_include_inherited_fields_and_enum_defaults() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let color = db.add_enum().expect("enum");
    db.set_type_name(color, "Color").expect("name");
    db.add_enumerator(color).expect("enumerator");
    db.add_enumerator(color).expect("enumerator");
    db.set_enumerator_value(color, 0, Some(3)).expect("value");
    let base = named_struct(&mut db, "Base");
    add_field(&mut db, base, "id", "u64");
    let pixel = named_struct(&mut db, "Pixel");
    db.set_record_base_type(pixel, Some(TypeReference::new(base)))
        .expect("base");
    add_field(&mut db, pixel, "color", "Color");
    add_field(&mut db, pixel, "tags", "list<string>");
    let value = default_of(&db, "Pixel");
    assert_eq!(value, json!({"id": 0, "color": 3, "tags": []}));
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["id", "color", "tags"]);
}

#[test]
fn visit_stops_when_asked() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let reference = db.parse_type("list<i32>").expect("type");
    let value = json!([1, 2, 3]);
    let mut seen = 0;
    let stopped = visit(db.registry(), &reference, &value, &mut |_, _, child| {
        seen += 1;
        child == &json!(2)
    });
    assert!(stopped);
    assert_eq!(seen, 2);
}

#[test]
fn visit_reports_paths_in_pre_order() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let reference = db.parse_type("map<string,list<i32>>").expect("type");
    let value = json!([["a", [1, 2]]]);
    let mut paths = Vec::new();
    visit(db.registry(), &reference, &value, &mut |_, path, _| {
        paths.push(path.to_string());
        false
    });
    assert_eq!(paths, ["[0].key", "[0].value", "[0].value[0]", "[0].value[1]"]);
}

#[test]
fn owned_values_are_walked_and_resolvable() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let node = named_struct(&mut db, "Node");
    add_field(&mut db, node, "next", "own<Node>");
    add_field(&mut db, node, "v", "i32");
    let reference = db.parse_type("Node").expect("type");
    let value = json!({"next": {"next": null, "v": 2}, "v": 1});
    assert!(conforms(db.registry(), &reference, &value));

    let i32_handle = db.resolve("i32").expect("i32");
    let mut found: Vec<(ValuePath, Value)> = Vec::new();
    visit(db.registry(), &reference, &value, &mut |child_type, path, child| {
        if child_type.handle == i32_handle {
            found.push((path.clone(), child.clone()));
        }
        false
    });
    let rendered: Vec<String> = found.iter().map(|(path, _)| path.to_string()).collect();
    assert_eq!(rendered, [".next*.v", ".v"]);
    for (path, child) in &found {
        assert_eq!(path.resolve(&value), Some(child));
    }
}

#[test]
fn records_cannot_contain_themselves() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let node = named_struct(&mut db, "Node");
    add_field(&mut db, node, "next", "own<Node>");
    add_field(&mut db, node, "parent", "ref<Node>");
    add_field(&mut db, node, "children", "list<own<Node>>");
    let added = db.add_field(node).expect("field");
    let by_value = db.parse_type("list<Node>").expect("type");
    let err = db.set_field_type(node, &added, by_value).unwrap_err();
    assert!(err.to_string().contains("cannot be stored by value"), "{}", err);
}

#[test]
fn containment_cycles_through_other_records_are_refused() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = named_struct(&mut db, "A");
    let b = named_struct(&mut db, "B");
    add_field(&mut db, a, "b", "array<B,2>");
    let added = db.add_field(b).expect("field");
    let back = db.parse_type("variant<i32,A>").expect("type");
    assert!(db.set_field_type(b, &added, back).is_err());
    let pointer = db.parse_type("ref<A>").expect("type");
    db.set_field_type(b, &added, pointer).expect("pointer is fine");
}

#[test]
fn a_base_cannot_hold_its_descendant_by_value() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let base = named_struct(&mut db, "Base");
    let derived = named_struct(&mut db, "Derived");
    db.set_record_base_type(derived, Some(TypeReference::new(base)))
        .expect("base");
    let added = db.add_field(base).expect("field");
    let held = db.parse_type("Derived").expect("type");
    let err = db.set_field_type(base, &added, held).unwrap_err();
    assert!(err.to_string().contains("'Derived' itself"), "{}", err);
}

#[test]
fn template_arguments_are_checked() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let color = db.add_enum().expect("enum");
    db.set_type_name(color, "Color").expect("name");
    let reason = |text: &str| db.parse_type(text).unwrap_err().to_string();
    assert!(reason("map<list<i32>,i32>").contains("requires a number, bool, string or enum"));
    assert!(reason("flags<i32>").contains("requires an enum"));
    assert!(reason("array<i32>").contains("expects 2 template argument(s)"));
    assert!(reason("list<i32,i32>").contains("takes at most 1"));
    assert!(reason("array<i32,i32>").contains("expects a size"));
    assert!(reason("list<4>").contains("expects a type"));
    assert!(db.parse_type("variant<i32,string,bool,Color>").is_ok());
    assert!(db.parse_type("flags<Color>").is_ok());
    assert!(db.parse_type("map<Color,list<vec4>>").is_ok());
}

#[test]
fn malformed_text_is_a_parse_error() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    assert!(matches!(db.parse_type("list<"), Err(TypewrightError::Parse { .. })));
    match db.parse_type("list<Missing>") {
        Err(TypewrightError::Parse { message, position }) => {
            assert!(message.contains("Missing"));
            assert_eq!(position, 5);
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn classification_of_type_pairs() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let point = named_struct(&mut db, "Point");
    let registry = db.registry();
    let parse = |text: &str| db.parse_type(text).expect("type");
    assert_eq!(classify(registry, &parse("list<i32>"), &parse("list<i32>")), ConversionResult::Preserved);
    assert_eq!(classify(registry, &parse("void"), &parse("i32")), ConversionResult::Preserved);
    assert_eq!(classify(registry, &parse("i32"), &parse("void")), ConversionResult::Lost);
    assert_eq!(classify(registry, &parse("f32"), &parse("string")), ConversionResult::Corrupted);
    assert_eq!(classify(registry, &parse("i32"), &parse("bytes")), ConversionResult::Lost);
    assert_eq!(classify(registry, &TypeReference::new(point), &parse("i32")), ConversionResult::Impossible);
    assert!(ConversionResult::Preserved < ConversionResult::Corrupted);
    assert!(ConversionResult::Lost < ConversionResult::Impossible);
}

#[test]
fn numeric_values_survive_a_round_trip_in_shape() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let registry = db.registry();
    let reference = |kind: BuiltinKind| TypeReference::new(registry.builtin(kind).expect("built-in"));
    for from in BuiltinKind::NUMERIC {
        for to in BuiltinKind::NUMERIC {
            let (a, b) = (reference(from), reference(to));
            let mut value = if from.is_floating() { json!(1.5) } else { json!(100) };
            let original = value.clone();
            convert(registry, &a, &b, &mut value);
            assert!(conforms(registry, &b, &value), "{:?} -> {:?}", from, to);
            convert(registry, &b, &a, &mut value);
            assert!(conforms(registry, &a, &value), "{:?} -> {:?} -> {:?}", from, to, from);
            if from == to {
                assert_eq!(value, original);
            }
        }
    }
}

#[test]
fn array_sizes_are_bounded() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    assert!(db.parse_type(&format!("array<i32,{}>", MAX_ARRAY_SIZE)).is_ok());
    let err = db
        .parse_type(&format!("array<i32,{}>", MAX_ARRAY_SIZE + 1))
        .unwrap_err();
    assert!(err.to_string().contains("at most"), "{}", err);
    let err = db.parse_type("array<i32,18446744073709551615>").unwrap_err();
    assert!(err.to_string().contains("at most"), "{}", err);
    assert!(db.parse_type("array<array<i32,1000>,1000>").is_ok());
    let err = db.parse_type("array<array<i32,1024>,1025>").unwrap_err();
    assert!(err.to_string().contains("would hold more than"), "{}", err);
}

#[test]
fn roots_with_oversized_defaults_are_refused() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let big = named_struct(&mut db, "Big");
    let per_field = 60000;
    let fields = MAX_DEFAULT_VALUES / per_field + 1;
    for index in 0..fields {
        add_field(&mut db, big, &format!("part{}", index), &format!("array<u8,{}>", per_field));
    }
    let changes = db.ledger().len();
    let err = db
        .add_root(MAIN_STORE, "big", TypeReference::new(big))
        .unwrap_err();
    assert!(err.to_string().contains("would hold more than"), "{}", err);
    assert!(db.store(MAIN_STORE).unwrap().root("big").is_none());
    assert_eq!(db.ledger().len(), changes);
}
