//! The editing session.
//!
//! [`Database`] owns the registry, the data stores and the change log, and
//! is the only way to change any of them. Every operation runs the same
//! steps: validate, mutate the schema, migrate every store, append an audit
//! record, persist. A failed validation returns before anything is touched.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::construct::{
    EnumeratorDefinition, FieldDefinition, FieldFlags, RecordDefinition, RecordFlags, TypeDefinition, TypeHandle,
    TypeReference, TypeUsage,
};
use crate::conversion::{ConversionResult, classify, convert};
use crate::datatype::{conforms, describe, initialize};
use crate::error::{Result, TypewrightError};
use crate::ledger::Ledger;
use crate::order::order;
use crate::persist::{PersistenceMode, Persistor, describe_type};
use crate::registry::TypeRegistry;
use crate::store::{DataStore, RootValue, conform, rename_key};
use crate::typeref::parse_type_reference;
use crate::validate::{
    validate_default_size, validate_enumerator_name, validate_field_flags, validate_field_name, validate_field_type,
    validate_identifier, validate_record, validate_record_base_type, validate_record_flags, validate_type_name,
    validate_type_reference,
};

/// The store every project has.
pub const MAIN_STORE: &str = "main";

fn checked<T>(action: &str, outcome: Result<T>) -> Result<T> {
    if let Err(e) = &outcome {
        debug!(action, reason = %e, "rejected");
    }
    outcome
}

fn fresh_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    (1..)
        .map(|suffix| format!("{}{}", base, suffix))
        .find(|candidate| !taken(candidate.as_str()))
        .unwrap_or_else(|| base.to_owned())
}

pub struct Database {
    registry: TypeRegistry,
    stores: BTreeMap<String, DataStore>,
    ledger: Ledger,
    persistor: Persistor,
}

impl Database {
    /// Opens a session, restoring whatever the project already holds.
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let persistor = Persistor::new(mode)?;
        let (registry, restored) = persistor.restore()?.unwrap_or_default();
        let mut stores: BTreeMap<String, DataStore> = restored
            .into_iter()
            .map(|store| (store.name().to_owned(), store))
            .collect();
        stores
            .entry(MAIN_STORE.to_owned())
            .or_insert_with(|| DataStore::new(MAIN_STORE));
        let ledger = persistor.open_ledger()?;
        info!(
            types = registry.user_types().len(),
            stores = stores.len(),
            changes = ledger.len(),
            "database opened"
        );
        Ok(Self {
            registry,
            stores,
            ledger,
            persistor,
        })
    }
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
    pub fn store(&self, name: &str) -> Option<&DataStore> {
        self.stores.get(name)
    }
    pub fn stores(&self) -> impl Iterator<Item = &DataStore> {
        self.stores.values()
    }
    pub fn resolve(&self, name: &str) -> Option<TypeHandle> {
        self.registry.resolve(name)
    }
    /// Parses and validates a textual type reference like `map<string,list<i32>>`.
    pub fn parse_type(&self, text: &str) -> Result<TypeReference> {
        let reference = parse_type_reference(&self.registry, text)?;
        validate_type_reference(&self.registry, &reference)?;
        validate_default_size(&self.registry, &reference)?;
        Ok(reference)
    }
    /// User-defined types in the order code emitters should write them.
    pub fn emission_order(&self) -> Vec<TypeHandle> {
        order(&self.registry, &self.registry.user_types())
    }
    pub fn describe_root(&self, store: &str, root: &str) -> Option<String> {
        let kept = self.stores.get(store)?.root(root)?;
        Some(describe(&self.registry, &kept.type_ref, &kept.value))
    }

    // ------------- Protocol -------------
    fn commit(&mut self, action: &str, params: Value) -> Result<()> {
        self.ledger.append(action, params)?;
        self.persistor.persist_schema(&self.registry)?;
        for store in self.stores.values() {
            self.persistor.persist_store(&self.registry, store)?;
        }
        info!(action, changes = self.ledger.len(), "committed");
        Ok(())
    }
    fn require_user_type(&self, handle: TypeHandle) -> Result<()> {
        if self.registry.definition(handle)?.is_builtin() {
            return Err(TypewrightError::invalid(format!(
                "'{}' is a built-in type and cannot be changed",
                self.registry.name_of(handle)
            )));
        }
        Ok(())
    }
    fn own_field(&self, record: TypeHandle, field: &str) -> Result<usize> {
        validate_record(&self.registry, record)?;
        self.registry
            .definition(record)?
            .record()
            .and_then(|own| own.field_index(field))
            .ok_or_else(|| {
                TypewrightError::invalid(format!(
                    "'{}' declares no field named '{}'",
                    self.registry.name_of(record),
                    field
                ))
            })
    }
    fn record(&self, record: TypeHandle) -> Result<&RecordDefinition> {
        self.registry.definition(record)?.record().ok_or_else(|| {
            TypewrightError::Invariant(format!("'{}' is not a record", self.registry.name_of(record)))
        })
    }
    fn record_mut(&mut self, record: TypeHandle) -> Result<&mut RecordDefinition> {
        self.registry
            .definition_mut(record)?
            .record_mut()
            .ok_or_else(|| TypewrightError::Invariant(format!("type {} is not a record", record)))
    }
    fn enumerators(&self, enumeration: TypeHandle) -> Result<&[EnumeratorDefinition]> {
        let definition = self.registry.definition(enumeration)?;
        definition
            .enumeration()
            .map(|body| body.enumerators.as_slice())
            .ok_or_else(|| TypewrightError::invalid(format!("'{}' is not an enum", definition.name())))
    }
    fn enumerators_mut(&mut self, enumeration: TypeHandle) -> Result<&mut Vec<EnumeratorDefinition>> {
        self.registry
            .definition_mut(enumeration)?
            .enumeration_mut()
            .map(|body| &mut body.enumerators)
            .ok_or_else(|| TypewrightError::Invariant(format!("type {} is not an enum", enumeration)))
    }
    /// Reshapes every stored object of `record` and its descendants to its
    /// current field list. Returns how many objects were visited and a backup
    /// of every value that had to go.
    fn conform_objects(&mut self, record: TypeHandle) -> (usize, Vec<Value>) {
        let registry = &self.registry;
        let mut backup = Vec::new();
        let mut count = 0;
        for store in self.stores.values_mut() {
            let store_name = store.name().to_owned();
            count += store.for_each_record_mut(registry, record, |root, path, declared, object| {
                for (key, value) in conform(registry, declared, object) {
                    backup.push(json!({
                        "store": store_name,
                        "root": root,
                        "path": path.to_string(),
                        "field": key,
                        "value": value,
                    }));
                }
            });
        }
        (count, backup)
    }

    // ------------- Types -------------
    pub fn add_struct(&mut self) -> Result<TypeHandle> {
        self.add_type("add_struct", "Struct", TypeDefinition::new_struct)
    }
    pub fn add_class(&mut self) -> Result<TypeHandle> {
        self.add_type("add_class", "Class", TypeDefinition::new_class)
    }
    pub fn add_enum(&mut self) -> Result<TypeHandle> {
        self.add_type("add_enum", "Enum", TypeDefinition::new_enum)
    }
    fn add_type(&mut self, action: &str, base: &str, make: fn(String) -> TypeDefinition) -> Result<TypeHandle> {
        let name = self.registry.fresh_type_name(base);
        let handle = self.registry.keep(make(name.clone()))?;
        self.commit(action, json!({ "name": name }))?;
        Ok(handle)
    }

    pub fn set_type_name(&mut self, handle: TypeHandle, new_name: &str) -> Result<()> {
        let action = "set_type_name";
        checked(action, self.require_user_type(handle))?;
        checked(action, validate_type_name(&self.registry, handle, new_name))?;
        let old_name = self.registry.name_of(handle).to_owned();
        self.registry.rename(handle, new_name)?;
        // roots hold handles, so their tags pick up the new name when persisted
        let roots: usize = self
            .stores
            .values()
            .map(|store| store.mentions(&self.registry, handle).len())
            .sum();
        self.commit(action, json!({ "from": old_name, "to": new_name, "roots": roots }))
    }

    pub fn set_record_base_type(&mut self, record: TypeHandle, base: Option<TypeReference>) -> Result<()> {
        let action = "set_record_base_type";
        checked(action, validate_record_base_type(&self.registry, record, base.as_ref()))?;
        let previous = self
            .registry
            .definition(record)?
            .base_type()
            .map(|reference| self.registry.render(reference));
        let rendered = base.as_ref().map(|reference| self.registry.render(reference));
        self.registry.definition_mut(record)?.base_type = base;
        let (migrated, backup) = self.conform_objects(record);
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "from": previous,
                "to": rendered,
                "migrated": migrated,
                "backup": backup,
            }),
        )
    }

    pub fn set_record_table(&mut self, record: TypeHandle, enabled: bool) -> Result<()> {
        let action = "set_record_table";
        checked(action, validate_record(&self.registry, record))?;
        let mut flags = self.record(record)?.flags;
        flags.set(RecordFlags::TABLE, enabled);
        checked(action, validate_record_flags(&self.registry, record, flags))?;
        self.record_mut(record)?.flags = flags;
        self.commit(
            action,
            json!({ "record": self.registry.name_of(record), "table": enabled }),
        )
    }

    /// Removes a type that nothing depends on any more. Stored roots holding
    /// its data are removed with it and backed up in the change log.
    pub fn delete_type(&mut self, handle: TypeHandle) -> Result<()> {
        let action = "delete_type";
        checked(action, self.require_user_type(handle))?;
        let type_name = self.registry.name_of(handle).to_owned();
        let usages = self.usages(handle);
        let blocking: Vec<String> = usages
            .iter()
            .filter(|usage| usage.is_blocking())
            .map(|usage| self.describe_usage(usage))
            .collect();
        if !blocking.is_empty() {
            debug!(action, type_name = %type_name, usages = blocking.len(), "rejected");
            return Err(TypewrightError::UsageConflict {
                type_name,
                usages: blocking,
            });
        }
        let definition = describe_type(&self.registry, handle)?;
        let mut removed_roots = Vec::new();
        for usage in usages {
            let TypeUsage::HasDataInStore { store, roots } = usage else {
                continue;
            };
            let Some(kept) = self.stores.get_mut(&store) else {
                continue;
            };
            for root in roots {
                if let Some(removed) = kept.remove(&root) {
                    removed_roots.push(json!({
                        "store": store,
                        "root": root,
                        "type": self.registry.render(&removed.type_ref),
                        "value": removed.value,
                    }));
                }
            }
        }
        let variant = self.registry.definition(handle)?.variant();
        self.registry.remove(handle)?;
        self.commit(
            action,
            json!({
                "name": type_name,
                "variant": variant,
                "definition": definition,
                "roots": removed_roots,
            }),
        )
    }

    // ------------- Usages -------------
    /// Every structural reason `handle` cannot simply disappear. A record
    /// referring to itself is not counted.
    pub fn usages(&self, handle: TypeHandle) -> Vec<TypeUsage> {
        let mut usages = Vec::new();
        for other in self.registry.user_types() {
            if other == handle {
                continue;
            }
            let Some(definition) = self.registry.get(other) else {
                continue;
            };
            if let Some(record) = definition.record() {
                for field in &record.fields {
                    let paths = field.field_type.occurrences(handle);
                    if !paths.is_empty() {
                        usages.push(TypeUsage::UsedInFieldType {
                            record: other,
                            field: field.name.clone(),
                            paths,
                        });
                    }
                }
            }
            if definition.base_type().is_some_and(|base| base.mentions(handle)) {
                usages.push(TypeUsage::IsBaseTypeOf { child: other });
            }
        }
        for store in self.stores.values() {
            let roots = store.mentions(&self.registry, handle);
            if !roots.is_empty() {
                usages.push(TypeUsage::HasDataInStore {
                    store: store.name().to_owned(),
                    roots,
                });
            }
        }
        usages
    }
    pub fn describe_usage(&self, usage: &TypeUsage) -> String {
        match usage {
            TypeUsage::UsedInFieldType { record, field, .. } => {
                let field_type = self
                    .registry
                    .get(*record)
                    .and_then(|definition| definition.record())
                    .and_then(|own| own.field(field))
                    .map(|own| self.registry.render(&own.field_type))
                    .unwrap_or_default();
                format!(
                    "  used by field {}.{} of type {}",
                    self.registry.name_of(*record),
                    field,
                    field_type
                )
            }
            TypeUsage::IsBaseTypeOf { child } => {
                format!("  is the base type of '{}'", self.registry.name_of(*child))
            }
            TypeUsage::HasDataInStore { store, roots } => {
                format!("  has data in store '{}' (roots: {})", store, roots.join(", "))
            }
        }
    }

    // ------------- Fields -------------
    pub fn add_field(&mut self, record: TypeHandle) -> Result<String> {
        let action = "add_field";
        checked(action, validate_record(&self.registry, record))?;
        let registry = &self.registry;
        let name = fresh_name("field", |candidate| {
            validate_field_name(registry, record, None, candidate).is_err()
        });
        let void = TypeReference::new(self.registry.void());
        self.record_mut(record)?
            .fields
            .push(FieldDefinition::new(name.clone(), void));
        let (migrated, _) = self.conform_objects(record);
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "field": name,
                "type": "void",
                "migrated": migrated,
            }),
        )?;
        Ok(name)
    }

    pub fn set_field_name(&mut self, record: TypeHandle, field: &str, new_name: &str) -> Result<()> {
        let action = "set_field_name";
        let index = checked(action, self.own_field(record, field))?;
        checked(action, validate_field_name(&self.registry, record, Some(field), new_name))?;
        self.record_mut(record)?.fields[index].name = new_name.to_owned();
        let registry = &self.registry;
        let mut migrated = 0;
        for store in self.stores.values_mut() {
            migrated += store.for_each_record_mut(registry, record, |_, _, _, object| {
                rename_key(object, field, new_name);
            });
        }
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "from": field,
                "to": new_name,
                "migrated": migrated,
            }),
        )
    }

    /// Changes a field's type and converts every stored value of it. The
    /// returned classification tells how much of the stored data survived.
    pub fn set_field_type(&mut self, record: TypeHandle, field: &str, new_type: TypeReference) -> Result<ConversionResult> {
        let action = "set_field_type";
        let index = checked(action, self.own_field(record, field))?;
        checked(action, validate_field_type(&self.registry, record, Some(&new_type)))?;
        let old = self.record(record)?.fields[index].clone();
        checked(action, validate_field_flags(&self.registry, record, &new_type, old.flags))?;
        self.record_mut(record)?.fields[index].field_type = new_type.clone();

        let registry = &self.registry;
        let result = classify(registry, &old.field_type, &new_type);
        let mut backup = Vec::new();
        let mut migrated = 0;
        for store in self.stores.values_mut() {
            let store_name = store.name().to_owned();
            migrated += store.for_each_record_mut(registry, record, |root, path, _, object| {
                let slot = object
                    .entry(old.name.clone())
                    .or_insert_with(|| initialize(registry, &old.field_type));
                let before = slot.clone();
                if convert(registry, &old.field_type, &new_type, slot) != ConversionResult::Preserved {
                    backup.push(json!({
                        "store": store_name,
                        "root": root,
                        "path": path.to_string(),
                        "value": before,
                    }));
                }
            });
        }
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "field": field,
                "from": self.registry.render(&old.field_type),
                "to": self.registry.render(&new_type),
                "result": result,
                "migrated": migrated,
                "backup": backup,
            }),
        )?;
        Ok(result)
    }

    /// What [`set_field_type`](Self::set_field_type) would report, without changing anything.
    pub fn classify_field_type_change(
        &self,
        record: TypeHandle,
        field: &str,
        new_type: &TypeReference,
    ) -> Result<ConversionResult> {
        let index = self.own_field(record, field)?;
        let old = &self.record(record)?.fields[index].field_type;
        Ok(classify(&self.registry, old, new_type))
    }

    pub fn set_field_flags(&mut self, record: TypeHandle, field: &str, flags: FieldFlags) -> Result<()> {
        let action = "set_field_flags";
        let index = checked(action, self.own_field(record, field))?;
        let field_type = self.record(record)?.fields[index].field_type.clone();
        checked(action, validate_field_flags(&self.registry, record, &field_type, flags))?;
        self.record_mut(record)?.fields[index].flags = flags;
        self.commit(
            action,
            json!({ "record": self.registry.name_of(record), "field": field, "flags": flags }),
        )
    }

    pub fn swap_fields(&mut self, record: TypeHandle, first: usize, second: usize) -> Result<()> {
        let action = "swap_fields";
        checked(action, validate_record(&self.registry, record))?;
        let count = self.record(record)?.fields.len();
        if let Some(position) = [first, second].into_iter().find(|position| *position >= count) {
            let e = TypewrightError::invalid(format!(
                "'{}' has no field at position {}",
                self.registry.name_of(record),
                position
            ));
            return checked(action, Err(e));
        }
        self.record_mut(record)?.fields.swap(first, second);
        let (migrated, _) = self.conform_objects(record);
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "first": first,
                "second": second,
                "migrated": migrated,
            }),
        )
    }

    /// Moves a field from a record down to one of its descendants. The field
    /// becomes the first own field of `to`. Objects of records that derive
    /// from `from` but not from `to` lose the value, which is backed up.
    pub fn move_field(&mut self, from: TypeHandle, field: &str, to: TypeHandle) -> Result<()> {
        let action = "move_field";
        let index = checked(action, self.own_field(from, field))?;
        checked(action, validate_record(&self.registry, to))?;
        if !self.registry.is_strict_ancestor(from, to) {
            let e = TypewrightError::invalid(format!(
                "'{}' does not derive from '{}'",
                self.registry.name_of(to),
                self.registry.name_of(from)
            ));
            return checked(action, Err(e));
        }
        if self.record(to)?.field(field).is_some() {
            let e = TypewrightError::invalid(format!(
                "'{}' already declares a field named '{}'",
                self.registry.name_of(to),
                field
            ));
            return checked(action, Err(e));
        }
        let declared = &self.record(from)?.fields[index];
        checked(
            action,
            validate_field_flags(&self.registry, to, &declared.field_type, declared.flags),
        )?;
        let moved = self.record_mut(from)?.fields.remove(index);
        self.record_mut(to)?.fields.insert(0, moved);
        let (migrated, backup) = self.conform_objects(from);
        self.commit(
            action,
            json!({
                "from": self.registry.name_of(from),
                "field": field,
                "to": self.registry.name_of(to),
                "migrated": migrated,
                "backup": backup,
            }),
        )
    }

    /// Flattens one level of inheritance: the base's fields are copied to the
    /// front of `record`, which then derives from its former grandparent.
    /// The base itself is left as it is.
    pub fn copy_fields_and_move_up_base_type_hierarchy(&mut self, record: TypeHandle) -> Result<()> {
        let action = "copy_fields_and_move_up_base_type_hierarchy";
        checked(action, validate_record(&self.registry, record))?;
        let Some(base) = self.registry.base_of(record) else {
            let e = TypewrightError::invalid(format!(
                "'{}' has no base type",
                self.registry.name_of(record)
            ));
            return checked(action, Err(e));
        };
        let grandparent = self.registry.definition(base)?.base_type().cloned();
        checked(
            action,
            validate_record_base_type(&self.registry, record, grandparent.as_ref()),
        )?;
        let copied = self.record(base)?.fields.clone();
        for field in &copied {
            checked(
                action,
                validate_field_flags(&self.registry, record, &field.field_type, field.flags),
            )?;
        }
        let names: Vec<String> = copied.iter().map(|field| field.name.clone()).collect();
        let rendered = grandparent.as_ref().map(|reference| self.registry.render(reference));
        let own = self.record_mut(record)?;
        let mut fields = copied;
        fields.append(&mut own.fields);
        own.fields = fields;
        self.registry.definition_mut(record)?.base_type = grandparent;
        let (migrated, _) = self.conform_objects(record);
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "base": self.registry.name_of(base),
                "new_base": rendered,
                "fields": names,
                "migrated": migrated,
            }),
        )
    }

    pub fn delete_field(&mut self, record: TypeHandle, field: &str) -> Result<()> {
        let action = "delete_field";
        let index = checked(action, self.own_field(record, field))?;
        let removed = self.record_mut(record)?.fields.remove(index);
        let (migrated, backup) = self.conform_objects(record);
        self.commit(
            action,
            json!({
                "record": self.registry.name_of(record),
                "field": removed.name,
                "type": self.registry.render(&removed.field_type),
                "flags": removed.flags,
                "description": removed.description,
                "migrated": migrated,
                "backup": backup,
            }),
        )
    }

    // ------------- Enumerators -------------
    pub fn add_enumerator(&mut self, enumeration: TypeHandle) -> Result<String> {
        let action = "add_enumerator";
        checked(action, self.enumerators(enumeration).map(|_| ()))?;
        let registry = &self.registry;
        let name = fresh_name("Value", |candidate| {
            validate_enumerator_name(registry, enumeration, None, candidate).is_err()
        });
        self.enumerators_mut(enumeration)?.push(EnumeratorDefinition {
            name: name.clone(),
            value: None,
            description: String::new(),
        });
        self.commit(
            action,
            json!({ "enum": self.registry.name_of(enumeration), "enumerator": name }),
        )?;
        Ok(name)
    }

    fn enumerator_index(&self, enumeration: TypeHandle, index: usize) -> Result<()> {
        let count = self.enumerators(enumeration)?.len();
        if index >= count {
            return Err(TypewrightError::invalid(format!(
                "'{}' has no enumerator at position {}",
                self.registry.name_of(enumeration),
                index
            )));
        }
        Ok(())
    }

    pub fn set_enumerator_name(&mut self, enumeration: TypeHandle, index: usize, new_name: &str) -> Result<()> {
        let action = "set_enumerator_name";
        checked(action, self.enumerator_index(enumeration, index))?;
        checked(
            action,
            validate_enumerator_name(&self.registry, enumeration, Some(index), new_name),
        )?;
        let enumerator = &mut self.enumerators_mut(enumeration)?[index];
        let old_name = std::mem::replace(&mut enumerator.name, new_name.to_owned());
        self.commit(
            action,
            json!({ "enum": self.registry.name_of(enumeration), "from": old_name, "to": new_name }),
        )
    }

    /// Changes an enumerator's explicit value. Stored values keep naming the
    /// same enumerators, so they are renumbered along with the schema.
    pub fn set_enumerator_value(&mut self, enumeration: TypeHandle, index: usize, value: Option<i64>) -> Result<()> {
        let action = "set_enumerator_value";
        checked(action, self.enumerator_index(enumeration, index))?;
        let old_values = self.enum_values(enumeration)?;
        self.enumerators_mut(enumeration)?[index].value = value;
        let new_values = self.enum_values(enumeration)?;
        let mapping: Vec<(i64, i64)> = old_values.iter().copied().zip(new_values.iter().copied()).collect();
        let migrated = self.renumber(enumeration, &mapping, None);
        self.commit(
            action,
            json!({
                "enum": self.registry.name_of(enumeration),
                "index": index,
                "from": old_values[index],
                "to": new_values[index],
                "migrated": migrated,
            }),
        )
    }

    /// Removes an enumerator. Stored values naming it fall back to the
    /// enum's default.
    pub fn delete_enumerator(&mut self, enumeration: TypeHandle, index: usize) -> Result<()> {
        let action = "delete_enumerator";
        checked(action, self.enumerator_index(enumeration, index))?;
        let old_values = self.enum_values(enumeration)?;
        let removed = self.enumerators_mut(enumeration)?.remove(index);
        let new_values = self.enum_values(enumeration)?;
        let mapping: Vec<(i64, i64)> = old_values
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(_, old)| *old)
            .zip(new_values.iter().copied())
            .collect();
        let fallback = new_values.first().copied().unwrap_or(0);
        let migrated = self.renumber(enumeration, &mapping, Some((old_values[index], fallback)));
        self.commit(
            action,
            json!({
                "enum": self.registry.name_of(enumeration),
                "enumerator": removed,
                "value": old_values[index],
                "migrated": migrated,
            }),
        )
    }

    fn enum_values(&self, enumeration: TypeHandle) -> Result<Vec<i64>> {
        let definition = self.registry.definition(enumeration)?;
        definition
            .enumeration()
            .map(|body| body.values())
            .ok_or_else(|| TypewrightError::Invariant(format!("'{}' is not an enum", definition.name())))
    }

    /// Rewrites stored values of an enum through `mapping` (first match
    /// wins). `removed` maps a value that no longer names anything.
    fn renumber(&mut self, enumeration: TypeHandle, mapping: &[(i64, i64)], removed: Option<(i64, i64)>) -> usize {
        let registry = &self.registry;
        let mut changed = 0;
        for store in self.stores.values_mut() {
            store.for_each_value_mut(
                registry,
                |declared| declared.handle == enumeration,
                |_, _, _, value| {
                    let Some(current) = value.as_i64() else {
                        return;
                    };
                    let target = mapping
                        .iter()
                        .find(|(old, _)| *old == current)
                        .map(|(_, new)| *new)
                        .or_else(|| removed.filter(|(old, _)| *old == current).map(|(_, fallback)| fallback));
                    if let Some(target) = target.filter(|target| *target != current) {
                        *value = json!(target);
                        changed += 1;
                    }
                },
            );
        }
        changed
    }

    // ------------- Stores -------------
    pub fn add_store(&mut self, name: &str) -> Result<()> {
        let action = "add_store";
        checked(action, validate_identifier(name))?;
        if self.stores.contains_key(name) {
            let e = TypewrightError::invalid(format!("A store named '{}' already exists", name));
            return checked(action, Err(e));
        }
        self.stores.insert(name.to_owned(), DataStore::new(name));
        self.commit(action, json!({ "store": name }))
    }

    fn existing_store(&self, store: &str) -> Result<&DataStore> {
        self.stores
            .get(store)
            .ok_or_else(|| TypewrightError::invalid(format!("There is no store named '{}'", store)))
    }

    /// Adds a root holding the default value of `type_ref`.
    pub fn add_root(&mut self, store: &str, root: &str, type_ref: TypeReference) -> Result<()> {
        let action = "add_root";
        let existing = checked(action, self.existing_store(store))?;
        checked(action, validate_identifier(root))?;
        if existing.root(root).is_some() {
            let e = TypewrightError::invalid(format!("Store '{}' already has a root named '{}'", store, root));
            return checked(action, Err(e));
        }
        checked(action, validate_type_reference(&self.registry, &type_ref))?;
        checked(action, validate_default_size(&self.registry, &type_ref))?;
        let value = initialize(&self.registry, &type_ref);
        let rendered = self.registry.render(&type_ref);
        if let Some(kept) = self.stores.get_mut(store) {
            kept.keep(root, RootValue::new(type_ref, value));
        }
        self.commit(action, json!({ "store": store, "root": root, "type": rendered }))
    }

    pub fn set_root_value(&mut self, store: &str, root: &str, value: Value) -> Result<()> {
        let action = "set_root_value";
        let existing = checked(action, self.existing_store(store))?;
        let Some(kept) = existing.root(root) else {
            let e = TypewrightError::invalid(format!("Store '{}' has no root named '{}'", store, root));
            return checked(action, Err(e));
        };
        if !conforms(&self.registry, &kept.type_ref, &value) {
            let e = TypewrightError::invalid(format!(
                "The value does not fit type '{}'",
                self.registry.render(&kept.type_ref)
            ));
            return checked(action, Err(e));
        }
        let slot = self
            .stores
            .get_mut(store)
            .and_then(|kept| kept.root_mut(root))
            .ok_or_else(|| TypewrightError::Invariant(format!("root '{}' vanished", root)))?;
        let previous = std::mem::replace(&mut slot.value, value.clone());
        self.commit(
            action,
            json!({ "store": store, "root": root, "from": previous, "to": value }),
        )
    }

    pub fn delete_root(&mut self, store: &str, root: &str) -> Result<()> {
        let action = "delete_root";
        checked(action, self.existing_store(store))?;
        let Some(removed) = self.stores.get_mut(store).and_then(|kept| kept.remove(root)) else {
            let e = TypewrightError::invalid(format!("Store '{}' has no root named '{}'", store, root));
            return checked(action, Err(e));
        };
        self.commit(
            action,
            json!({
                "store": store,
                "root": root,
                "type": self.registry.render(&removed.type_ref),
                "value": removed.value,
            }),
        )
    }
}
