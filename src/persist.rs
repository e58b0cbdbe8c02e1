// used for persistence
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::construct::{
    EnumeratorDefinition, FieldDefinition, FieldFlags, RecordFlags, TemplateParameter, TypeDefinition,
    TypeHandle, TypeReference, TypeVariant,
};
use crate::datatype::conforms;
use crate::error::{Result, TypewrightError};
use crate::ledger::Ledger;
use crate::registry::TypeRegistry;
use crate::store::{DataStore, RootValue};
use crate::typeref::parse_type_reference;
use crate::validate::validate_type_reference;

pub const SCHEMA_VERSION: u32 = 1;
pub const STORE_FORMAT: &str = "typewright-store-1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Nothing touches the disk; the change log lives in memory only.
    InMemory,
    /// `<name>.schema.json`, `<name>.<store>.store.json` and
    /// `<name>.changelog.jsonl` inside `directory`.
    Project { directory: PathBuf, name: String },
}

// ------------- Documents -------------
#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub version: u32,
    pub types: BTreeMap<String, TypeVariant>,
    pub typedesc: BTreeMap<String, TypeDescriptor>,
    /// The maps above are sorted by name, this keeps declaration order.
    #[serde(default)]
    pub declaration_order: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_parameters: Vec<TemplateParameter>,
    #[serde(default, skip_serializing_if = "RecordFlags::is_empty")]
    pub flags: RecordFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enumerators: Vec<EnumeratorDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "FieldFlags::is_empty")]
    pub flags: FieldFlags,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDocument {
    pub format: String,
    pub schema: String,
    pub roots: BTreeMap<String, RootDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: Value,
}

/// The persisted form of a user-defined type, with every type reference rendered as text.
pub fn describe_type(registry: &TypeRegistry, handle: TypeHandle) -> Result<TypeDescriptor> {
    let definition = registry.definition(handle)?;
    let mut descriptor = TypeDescriptor {
        base: definition.base_type().map(|base| registry.render(base)),
        template_parameters: definition.template_parameters().to_vec(),
        ..TypeDescriptor::default()
    };
    if let Some(record) = definition.record() {
        descriptor.flags = record.flags;
        descriptor.fields = record
            .fields
            .iter()
            .map(|field| FieldDescriptor {
                name: field.name.clone(),
                field_type: registry.render(&field.field_type),
                flags: field.flags,
                description: field.description.clone(),
            })
            .collect();
    }
    if let Some(enumeration) = definition.enumeration() {
        descriptor.enumerators = enumeration.enumerators.clone();
    }
    Ok(descriptor)
}

// ------------- Persistence -------------
#[derive(Debug)]
pub struct Persistor {
    mode: PersistenceMode,
}

impl Persistor {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        if let PersistenceMode::Project { directory, .. } = &mode {
            fs::create_dir_all(directory).map_err(|e| {
                TypewrightError::Persistence(format!("cannot create '{}': {}", directory.display(), e))
            })?;
        }
        Ok(Self { mode })
    }
    pub fn mode(&self) -> &PersistenceMode {
        &self.mode
    }
    fn project_path(&self, suffix: &str) -> Option<PathBuf> {
        match &self.mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::Project { directory, name } => Some(directory.join(format!("{}.{}", name, suffix))),
        }
    }
    pub fn schema_path(&self) -> Option<PathBuf> {
        self.project_path("schema.json")
    }
    pub fn store_path(&self, store: &str) -> Option<PathBuf> {
        self.project_path(&format!("{}.store.json", store))
    }
    pub fn changelog_path(&self) -> Option<PathBuf> {
        self.project_path("changelog.jsonl")
    }
    pub fn open_ledger(&self) -> Result<Ledger> {
        match self.changelog_path() {
            Some(path) => Ledger::open(&path),
            None => Ok(Ledger::in_memory()),
        }
    }

    pub fn persist_schema(&self, registry: &TypeRegistry) -> Result<()> {
        let Some(path) = self.schema_path() else {
            return Ok(());
        };
        let mut document = SchemaDocument {
            version: SCHEMA_VERSION,
            types: BTreeMap::new(),
            typedesc: BTreeMap::new(),
            declaration_order: Vec::new(),
        };
        for handle in registry.user_types() {
            let definition = registry.definition(handle)?;
            let name = definition.name().to_owned();
            document.types.insert(name.clone(), definition.variant());
            document.typedesc.insert(name.clone(), describe_type(registry, handle)?);
            document.declaration_order.push(name);
        }
        write_document(&path, &document)
    }
    pub fn persist_store(&self, registry: &TypeRegistry, store: &DataStore) -> Result<()> {
        let (Some(path), PersistenceMode::Project { name, .. }) = (self.store_path(store.name()), &self.mode) else {
            return Ok(());
        };
        let document = StoreDocument {
            format: STORE_FORMAT.to_owned(),
            schema: name.clone(),
            roots: store
                .roots()
                .iter()
                .map(|(root, kept)| {
                    (
                        root.clone(),
                        RootDocument {
                            type_name: registry.render(&kept.type_ref),
                            value: kept.value.clone(),
                        },
                    )
                })
                .collect(),
        };
        write_document(&path, &document)
    }

    /// Reads the project back. `None` means there is nothing on disk yet.
    pub fn restore(&self) -> Result<Option<(TypeRegistry, Vec<DataStore>)>> {
        let (Some(schema_path), PersistenceMode::Project { directory, name }) = (self.schema_path(), &self.mode)
        else {
            return Ok(None);
        };
        if !schema_path.exists() {
            return Ok(None);
        }
        let document: SchemaDocument = read_document(&schema_path)?;
        let registry = restore_schema(document)?;
        let mut stores = Vec::new();
        let prefix = format!("{}.", name);
        for entry in fs::read_dir(directory)? {
            let file_name = entry?.file_name().to_string_lossy().into_owned();
            let Some(store_name) = file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".store.json"))
            else {
                continue;
            };
            let document: StoreDocument = read_document(&directory.join(&file_name))?;
            stores.push(restore_store(&registry, name, store_name, document)?);
        }
        info!(
            path = %schema_path.display(),
            types = registry.user_types().len(),
            stores = stores.len(),
            "project restored"
        );
        Ok(Some((registry, stores)))
    }
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(document)?;
    fs::write(path, text)
        .map_err(|e| TypewrightError::Persistence(format!("cannot write '{}': {}", path.display(), e)))
}

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| TypewrightError::corruption(format!("'{}' is unreadable: {}", path.display(), e)))
}

fn restore_schema(document: SchemaDocument) -> Result<TypeRegistry> {
    if document.version != SCHEMA_VERSION {
        return Err(TypewrightError::corruption(format!(
            "schema version {} is not supported, expected {}",
            document.version, SCHEMA_VERSION
        )));
    }
    let mut names: Vec<String> = document
        .declaration_order
        .iter()
        .filter(|name| document.types.contains_key(*name))
        .cloned()
        .collect();
    for name in document.types.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    // every type has to exist before references between them can be resolved
    let mut registry = TypeRegistry::new();
    let mut handles = Vec::with_capacity(names.len());
    for name in &names {
        let definition = match document.types[name] {
            TypeVariant::Struct => TypeDefinition::new_struct(name.clone()),
            TypeVariant::Class => TypeDefinition::new_class(name.clone()),
            TypeVariant::Enum => TypeDefinition::new_enum(name.clone()),
            TypeVariant::BuiltIn => {
                return Err(TypewrightError::corruption(format!(
                    "'{}' is declared as a built-in type",
                    name
                )));
            }
        };
        let handle = registry
            .keep(definition)
            .map_err(|e| TypewrightError::corruption(format!("type '{}' cannot be restored: {}", name, e)))?;
        handles.push(handle);
    }
    for (name, handle) in names.iter().zip(handles) {
        let descriptor = document
            .typedesc
            .get(name)
            .ok_or_else(|| TypewrightError::corruption(format!("type '{}' has no description", name)))?;
        let base = match &descriptor.base {
            Some(text) => Some(resolve_persisted(&registry, text, name)?),
            None => None,
        };
        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            let mut restored = FieldDefinition::new(
                field.name.clone(),
                resolve_persisted(&registry, &field.field_type, name)?,
            );
            restored.flags = field.flags;
            restored.description = field.description.clone();
            fields.push(restored);
        }
        let definition = registry.definition_mut(handle)?;
        definition.base_type = base;
        definition.template_parameters = descriptor.template_parameters.clone();
        if let Some(record) = definition.record_mut() {
            record.flags = descriptor.flags;
            record.fields = fields;
        } else if let Some(enumeration) = definition.enumeration_mut() {
            enumeration.enumerators = descriptor.enumerators.clone();
        }
    }
    Ok(registry)
}

fn resolve_persisted(registry: &TypeRegistry, text: &str, owner: &str) -> Result<TypeReference> {
    let reference = parse_type_reference(registry, text)
        .map_err(|e| TypewrightError::corruption(format!("'{}' in '{}' does not resolve: {}", text, owner, e)))?;
    validate_type_reference(registry, &reference)
        .map_err(|e| TypewrightError::corruption(format!("'{}' in '{}' is not legal: {}", text, owner, e)))?;
    Ok(reference)
}

fn restore_store(registry: &TypeRegistry, project: &str, name: &str, document: StoreDocument) -> Result<DataStore> {
    if document.format != STORE_FORMAT {
        return Err(TypewrightError::corruption(format!(
            "store '{}' has format '{}', expected '{}'",
            name, document.format, STORE_FORMAT
        )));
    }
    if document.schema != project {
        return Err(TypewrightError::corruption(format!(
            "store '{}' belongs to schema '{}', not '{}'",
            name, document.schema, project
        )));
    }
    let mut store = DataStore::new(name);
    for (root, kept) in document.roots {
        let type_ref = resolve_persisted(registry, &kept.type_name, &root)?;
        if !conforms(registry, &type_ref, &kept.value) {
            warn!(store = name, root = %root, type_name = %kept.type_name, "stored value does not match its type");
        }
        store.keep(&root, RootValue::new(type_ref, kept.value));
    }
    Ok(store)
}
