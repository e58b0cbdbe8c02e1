//! Typewright – schema definitions whose stored data follows every change.
//!
//! A schema consists of *types*: structs, classes and enums declared by the
//! user, plus a fixed set of built-in types. Some built-ins are generic and
//! take template arguments, e.g. `list<i32>`, `array<f32,4>`, `own<Node>` or
//! `map<string,list<Point>>`. Next to the schema live *data stores*, named
//! collections of root values typed by the schema.
//!
//! The point of the crate is that the schema can be edited while data exists.
//! Every edit goes through the [`database::Database`], which:
//! * validates the change (see [`validate`]) and refuses it without side effects,
//! * applies it to the [`registry::TypeRegistry`],
//! * migrates every stored value so that it keeps matching the schema,
//! * appends a hash-chained record to the change log ([`ledger`]),
//! * and persists schema, stores and log ([`persist`]).
//!
//! ## Modules
//! * [`construct`] – Types, template parameters, type references, fields, enumerators.
//! * [`registry`] – The arena that owns every type definition, built-ins included.
//! * [`typeref`] – Parser for textual type references (grammar in `typeref.pest`).
//! * [`datatype`] – Default values, traversal and shape checks for stored values.
//! * [`conversion`] – Value conversion between built-in types and its classification.
//! * [`validate`] – Identifier, template argument, inheritance and completeness checks.
//! * [`order`] – Dependency order of types for code emitters.
//! * [`store`] – Data stores and their root values.
//! * [`ledger`] – The change log.
//! * [`persist`] – JSON documents on disk.
//! * [`config`] – Settings for the command line tool.
//!
//! ## Completeness
//! A field holds its value in place, so a record cannot contain itself:
//! `list<Self>` is refused. Slots of `ref<>` and `own<>` may point at types
//! that are not complete yet, which makes `own<Self>` linked structures legal.
//!
//! ## Quick Start
//! ```
//! use typewright::{database::Database, persist::PersistenceMode, conversion::ConversionResult};
//! use serde_json::json;
//!
//! let mut db = Database::new(PersistenceMode::InMemory).unwrap();
//! let point = db.add_struct().unwrap();
//! db.set_type_name(point, "Point").unwrap();
//! let x = db.add_field(point).unwrap();
//! db.set_field_name(point, &x, "x").unwrap();
//! let f32_type = db.parse_type("f32").unwrap();
//! db.set_field_type(point, "x", f32_type).unwrap();
//! let point_type = db.parse_type("Point").unwrap();
//! db.add_root("main", "origin", point_type).unwrap();
//! let i32_type = db.parse_type("i32").unwrap();
//! assert_eq!(db.set_field_type(point, "x", i32_type).unwrap(), ConversionResult::Corrupted);
//! assert_eq!(db.store("main").unwrap().root("origin").unwrap().value, json!({"x": 0}));
//! ```

pub mod config;
pub mod construct;
pub mod conversion;
pub mod database;
pub mod datatype;
pub mod error;
pub mod ledger;
pub mod order;
pub mod persist;
pub mod registry;
pub mod store;
pub mod typeref;
pub mod validate;
