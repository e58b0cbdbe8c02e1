use typewright::construct::{TypeHandle, TypeReference};
use typewright::database::Database;
use typewright::order::{order, required_dependencies};
use typewright::persist::PersistenceMode;

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

fn names(db: &Database, handles: &[TypeHandle]) -> Vec<String> {
    handles
        .iter()
        .map(|handle| db.registry().name_of(*handle).to_owned())
        .collect()
}

#[test]
fn value_dependencies_come_first() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = named_struct(&mut db, "A");
    let b = named_struct(&mut db, "B");
    named_struct(&mut db, "C");
    add_field(&mut db, a, "b", "B");
    add_field(&mut db, b, "c", "array<C,3>");
    assert_eq!(names(&db, &db.emission_order()), ["C", "B", "A"]);
}

#[test]
fn pointers_do_not_force_an_order() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let x = named_struct(&mut db, "X");
    named_struct(&mut db, "Y");
    add_field(&mut db, x, "y", "ref<Y>");
    add_field(&mut db, x, "z", "own<Y>");
    assert_eq!(names(&db, &db.emission_order()), ["X", "Y"]);
}

#[test]
fn self_referential_schemas_terminate() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let node = named_struct(&mut db, "Node");
    let list = named_struct(&mut db, "List");
    add_field(&mut db, node, "next", "own<Node>");
    add_field(&mut db, list, "head", "own<Node>");
    add_field(&mut db, list, "nodes", "list<Node>");
    let ordered = db.emission_order();
    assert_eq!(names(&db, &ordered), ["Node", "List"]);
}

#[test]
fn base_types_precede_their_children() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let derived = named_struct(&mut db, "Derived");
    let base = named_struct(&mut db, "Base");
    db.set_record_base_type(derived, Some(TypeReference::new(base)))
        .expect("base");
    assert_eq!(names(&db, &db.emission_order()), ["Base", "Derived"]);
}

#[test]
fn only_requested_types_are_placed() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = named_struct(&mut db, "A");
    let b = named_struct(&mut db, "B");
    add_field(&mut db, a, "lookup", "map<string,list<B>>");
    assert_eq!(order(db.registry(), &[a]), vec![a]);
    assert_eq!(order(db.registry(), &[a, b]), vec![b, a]);

    let dependencies = required_dependencies(db.registry(), a);
    for name in ["map", "string", "list", "B"] {
        let handle = db.resolve(name).expect("type");
        assert!(dependencies.contains(&handle), "{}", name);
    }
}
