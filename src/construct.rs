//! Schema building blocks.
//!
//! Every definition lives in the [`crate::registry::TypeRegistry`] arena and
//! is addressed by a [`TypeHandle`]. References between definitions (base
//! types, field types, template arguments) are handles, so renaming a type
//! never has to chase down the places that point at it.

// used to print out readable forms of a construct
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ------------- TypeHandle -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub(crate) usize);

impl TypeHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}
impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ------------- Qualifier -------------
/// Constraint on what may be substituted into a template parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Qualifier {
    AnyType,
    Struct,
    NotClass,
    Enum,
    Integral,
    Floating,
    Size,
    Pointer,
    Class,
    Scalar,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ParameterFlags: u8 {
        const MULTIPLE = 1;
        const CAN_BE_INCOMPLETE = 1 << 1;
    }
}

// ------------- TemplateParameter -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    pub qualifier: Qualifier,
    #[serde(default)]
    pub flags: ParameterFlags,
}

impl TemplateParameter {
    pub fn new(name: &str, qualifier: Qualifier, flags: ParameterFlags) -> Self {
        Self {
            name: name.to_owned(),
            qualifier,
            flags,
        }
    }
    /// Whatever is substituted here has to be fully defined first.
    pub fn must_be_complete(&self) -> bool {
        !self.flags.contains(ParameterFlags::CAN_BE_INCOMPLETE)
    }
}

// ------------- TypeReference -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TemplateArgument {
    Size(u64),
    Type(TypeReference),
}

/// A concrete instantiation such as `map<string,list<i32>>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeReference {
    pub handle: TypeHandle,
    pub arguments: Vec<TemplateArgument>,
}

impl TypeReference {
    pub fn new(handle: TypeHandle) -> Self {
        Self {
            handle,
            arguments: Vec::new(),
        }
    }
    pub fn with_arguments(handle: TypeHandle, arguments: Vec<TemplateArgument>) -> Self {
        Self { handle, arguments }
    }
    pub fn type_argument(&self, index: usize) -> Option<&TypeReference> {
        match self.arguments.get(index) {
            Some(TemplateArgument::Type(reference)) => Some(reference),
            _ => None,
        }
    }
    pub fn size_argument(&self, index: usize) -> Option<u64> {
        match self.arguments.get(index) {
            Some(TemplateArgument::Size(size)) => Some(*size),
            _ => None,
        }
    }
    pub fn type_arguments(&self) -> impl Iterator<Item = &TypeReference> {
        self.arguments.iter().filter_map(|argument| match argument {
            TemplateArgument::Type(reference) => Some(reference),
            TemplateArgument::Size(_) => None,
        })
    }
    /// True if `handle` is this reference or occurs anywhere among its arguments.
    pub fn mentions(&self, handle: TypeHandle) -> bool {
        self.handle == handle || self.type_arguments().any(|inner| inner.mentions(handle))
    }
    /// Argument index paths leading to every occurrence of `handle`.
    pub fn occurrences(&self, handle: TypeHandle) -> Vec<Vec<usize>> {
        let mut found = Vec::new();
        if self.handle == handle {
            found.push(Vec::new());
        }
        for (index, argument) in self.arguments.iter().enumerate() {
            if let TemplateArgument::Type(inner) = argument {
                for mut path in inner.occurrences(handle) {
                    path.insert(0, index);
                    found.push(path);
                }
            }
        }
        found
    }
}

// ------------- Fields -------------
bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FieldFlags: u16 {
        const PRIVATE = 1;
        const TRANSIENT = 1 << 1;
        const GETTER = 1 << 2;
        const SETTER = 1 << 3;
        const UNIQUE = 1 << 4;
        const INDEXED = 1 << 5;
        const NO_EDIT = 1 << 6;
        const NO_VIEW = 1 << 7;
        const NO_DEBUG = 1 << 8;
        const NO_CLONE = 1 << 9;
        const NO_SERIALIZE = 1 << 10;
        const NO_DESERIALIZE = 1 << 11;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: TypeReference,
    pub flags: FieldFlags,
    pub description: String,
}

impl FieldDefinition {
    pub fn new(name: String, field_type: TypeReference) -> Self {
        Self {
            name,
            field_type,
            flags: FieldFlags::empty(),
            description: String::new(),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RecordFlags: u8 {
        /// Struct values are kept as table rows, which enables unique and indexed fields.
        const TABLE = 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordDefinition {
    pub fields: Vec<FieldDefinition>,
    pub flags: RecordFlags,
}

impl RecordDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

// ------------- Enumerators -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratorDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnumDefinition {
    pub enumerators: Vec<EnumeratorDefinition>,
}

impl EnumDefinition {
    /// Effective values: an enumerator without an explicit value follows its predecessor.
    pub fn values(&self) -> Vec<i64> {
        let mut next = 0i64;
        self.enumerators
            .iter()
            .map(|enumerator| {
                let value = enumerator.value.unwrap_or(next);
                next = value.wrapping_add(1);
                value
            })
            .collect()
    }
    pub fn default_value(&self) -> i64 {
        self.values().first().copied().unwrap_or(0)
    }
    pub fn enumerator(&self, name: &str) -> Option<&EnumeratorDefinition> {
        self.enumerators.iter().find(|enumerator| enumerator.name == name)
    }
}

// ------------- Built-ins -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VectorComponent {
    Bool,
    Int,
    Unsigned,
    Double,
    Float,
}

impl VectorComponent {
    const ALL: [VectorComponent; 5] = [
        VectorComponent::Bool,
        VectorComponent::Int,
        VectorComponent::Unsigned,
        VectorComponent::Double,
        VectorComponent::Float,
    ];
    fn prefix(&self) -> &'static str {
        match self {
            VectorComponent::Bool => "b",
            VectorComponent::Int => "i",
            VectorComponent::Unsigned => "u",
            VectorComponent::Double => "d",
            VectorComponent::Float => "",
        }
    }
    /// The scalar built-in a single component is stored as.
    pub fn scalar(&self) -> BuiltinKind {
        match self {
            VectorComponent::Bool => BuiltinKind::Bool,
            VectorComponent::Int => BuiltinKind::I32,
            VectorComponent::Unsigned => BuiltinKind::U32,
            VectorComponent::Double => BuiltinKind::F64,
            VectorComponent::Float => BuiltinKind::F32,
        }
    }
}

/// The closed set of types the platform provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinKind {
    Void,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    String,
    Bytes,
    Flags,
    List,
    Array,
    Ref,
    Own,
    Variant,
    Map,
    Json,
    Vector(VectorComponent, u8),
}

impl BuiltinKind {
    pub const NUMERIC: [BuiltinKind; 10] = [
        BuiltinKind::F32,
        BuiltinKind::F64,
        BuiltinKind::I8,
        BuiltinKind::I16,
        BuiltinKind::I32,
        BuiltinKind::I64,
        BuiltinKind::U8,
        BuiltinKind::U16,
        BuiltinKind::U32,
        BuiltinKind::U64,
    ];

    /// Every built-in in seeding order.
    pub fn all() -> Vec<BuiltinKind> {
        let mut kinds = vec![BuiltinKind::Void];
        kinds.extend(BuiltinKind::NUMERIC);
        kinds.extend([
            BuiltinKind::Bool,
            BuiltinKind::String,
            BuiltinKind::Bytes,
            BuiltinKind::Flags,
            BuiltinKind::List,
            BuiltinKind::Array,
            BuiltinKind::Ref,
            BuiltinKind::Own,
            BuiltinKind::Variant,
            BuiltinKind::Map,
            BuiltinKind::Json,
        ]);
        for component in VectorComponent::ALL {
            for size in 2..=4 {
                kinds.push(BuiltinKind::Vector(component, size));
            }
        }
        kinds
    }
    pub fn name(&self) -> String {
        match self {
            BuiltinKind::Void => "void".into(),
            BuiltinKind::F32 => "f32".into(),
            BuiltinKind::F64 => "f64".into(),
            BuiltinKind::I8 => "i8".into(),
            BuiltinKind::I16 => "i16".into(),
            BuiltinKind::I32 => "i32".into(),
            BuiltinKind::I64 => "i64".into(),
            BuiltinKind::U8 => "u8".into(),
            BuiltinKind::U16 => "u16".into(),
            BuiltinKind::U32 => "u32".into(),
            BuiltinKind::U64 => "u64".into(),
            BuiltinKind::Bool => "bool".into(),
            BuiltinKind::String => "string".into(),
            BuiltinKind::Bytes => "bytes".into(),
            BuiltinKind::Flags => "flags".into(),
            BuiltinKind::List => "list".into(),
            BuiltinKind::Array => "array".into(),
            BuiltinKind::Ref => "ref".into(),
            BuiltinKind::Own => "own".into(),
            BuiltinKind::Variant => "variant".into(),
            BuiltinKind::Map => "map".into(),
            BuiltinKind::Json => "json".into(),
            BuiltinKind::Vector(component, size) => format!("{}vec{}", component.prefix(), size),
        }
    }
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            BuiltinKind::I8
                | BuiltinKind::I16
                | BuiltinKind::I32
                | BuiltinKind::I64
                | BuiltinKind::U8
                | BuiltinKind::U16
                | BuiltinKind::U32
                | BuiltinKind::U64
        )
    }
    pub fn is_floating(&self) -> bool {
        matches!(self, BuiltinKind::F32 | BuiltinKind::F64)
    }
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }
    pub fn parameters(&self) -> Vec<TemplateParameter> {
        use ParameterFlags as P;
        match self {
            BuiltinKind::Flags => vec![TemplateParameter::new("ENUM", Qualifier::Enum, P::empty())],
            BuiltinKind::List => vec![TemplateParameter::new("ELEMENT", Qualifier::AnyType, P::empty())],
            BuiltinKind::Array => vec![
                TemplateParameter::new("ELEMENT", Qualifier::AnyType, P::empty()),
                TemplateParameter::new("SIZE", Qualifier::Size, P::empty()),
            ],
            BuiltinKind::Ref | BuiltinKind::Own => vec![TemplateParameter::new(
                "POINTEE",
                Qualifier::AnyType,
                P::CAN_BE_INCOMPLETE,
            )],
            BuiltinKind::Variant => vec![TemplateParameter::new("TYPES", Qualifier::AnyType, P::MULTIPLE)],
            BuiltinKind::Map => vec![
                TemplateParameter::new("KEY", Qualifier::Scalar, P::empty()),
                TemplateParameter::new("VALUE", Qualifier::AnyType, P::empty()),
            ],
            _ => Vec::new(),
        }
    }
    pub fn qualifiers(&self) -> Vec<Qualifier> {
        use Qualifier as Q;
        match self {
            BuiltinKind::Void => vec![Q::AnyType],
            kind if kind.is_integral() => vec![Q::AnyType, Q::NotClass, Q::Scalar, Q::Integral],
            kind if kind.is_floating() => vec![Q::AnyType, Q::NotClass, Q::Scalar, Q::Floating],
            BuiltinKind::Bool | BuiltinKind::String => vec![Q::AnyType, Q::NotClass, Q::Scalar],
            BuiltinKind::Ref | BuiltinKind::Own => vec![Q::AnyType, Q::NotClass, Q::Pointer],
            _ => vec![Q::AnyType, Q::NotClass],
        }
    }
    /// Whether values may hold owning or otherwise GC-relevant references.
    pub fn markable(&self) -> bool {
        matches!(
            self,
            BuiltinKind::List
                | BuiltinKind::Array
                | BuiltinKind::Ref
                | BuiltinKind::Own
                | BuiltinKind::Variant
                | BuiltinKind::Map
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinDefinition {
    pub kind: BuiltinKind,
    pub qualifiers: Vec<Qualifier>,
    pub markable: bool,
}

// ------------- TypeDefinition -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeVariant {
    BuiltIn,
    Enum,
    Struct,
    Class,
}

impl fmt::Display for TypeVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeVariant::BuiltIn => write!(f, "built-in type"),
            TypeVariant::Enum => write!(f, "enum"),
            TypeVariant::Struct => write!(f, "struct"),
            TypeVariant::Class => write!(f, "class"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeBody {
    BuiltIn(BuiltinDefinition),
    Enum(EnumDefinition),
    Struct(RecordDefinition),
    Class(RecordDefinition),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDefinition {
    // Fields are only reachable from within the crate; everything outside
    // goes through the getters, and changes go through the Database.
    pub(crate) name: String,
    pub(crate) base_type: Option<TypeReference>,
    pub(crate) template_parameters: Vec<TemplateParameter>,
    pub(crate) body: TypeBody,
}

impl TypeDefinition {
    pub fn builtin(kind: BuiltinKind) -> Self {
        Self {
            name: kind.name(),
            base_type: None,
            template_parameters: kind.parameters(),
            body: TypeBody::BuiltIn(BuiltinDefinition {
                kind,
                qualifiers: kind.qualifiers(),
                markable: kind.markable(),
            }),
        }
    }
    pub fn new_struct(name: String) -> Self {
        Self::user(name, TypeBody::Struct(RecordDefinition::default()))
    }
    pub fn new_class(name: String) -> Self {
        Self::user(name, TypeBody::Class(RecordDefinition::default()))
    }
    pub fn new_enum(name: String) -> Self {
        Self::user(name, TypeBody::Enum(EnumDefinition::default()))
    }
    fn user(name: String, body: TypeBody) -> Self {
        Self {
            name,
            base_type: None,
            template_parameters: Vec::new(),
            body,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn base_type(&self) -> Option<&TypeReference> {
        self.base_type.as_ref()
    }
    pub fn template_parameters(&self) -> &[TemplateParameter] {
        &self.template_parameters
    }
    pub fn body(&self) -> &TypeBody {
        &self.body
    }
    pub fn variant(&self) -> TypeVariant {
        match self.body {
            TypeBody::BuiltIn(_) => TypeVariant::BuiltIn,
            TypeBody::Enum(_) => TypeVariant::Enum,
            TypeBody::Struct(_) => TypeVariant::Struct,
            TypeBody::Class(_) => TypeVariant::Class,
        }
    }
    pub fn is_builtin(&self) -> bool {
        matches!(self.body, TypeBody::BuiltIn(_))
    }
    pub fn is_record(&self) -> bool {
        matches!(self.body, TypeBody::Struct(_) | TypeBody::Class(_))
    }
    pub fn builtin_kind(&self) -> Option<BuiltinKind> {
        match &self.body {
            TypeBody::BuiltIn(builtin) => Some(builtin.kind),
            _ => None,
        }
    }
    pub fn record(&self) -> Option<&RecordDefinition> {
        match &self.body {
            TypeBody::Struct(record) | TypeBody::Class(record) => Some(record),
            _ => None,
        }
    }
    pub(crate) fn record_mut(&mut self) -> Option<&mut RecordDefinition> {
        match &mut self.body {
            TypeBody::Struct(record) | TypeBody::Class(record) => Some(record),
            _ => None,
        }
    }
    pub fn enumeration(&self) -> Option<&EnumDefinition> {
        match &self.body {
            TypeBody::Enum(enumeration) => Some(enumeration),
            _ => None,
        }
    }
    pub(crate) fn enumeration_mut(&mut self) -> Option<&mut EnumDefinition> {
        match &mut self.body {
            TypeBody::Enum(enumeration) => Some(enumeration),
            _ => None,
        }
    }
    /// The parameter the argument at `index` is checked against. Surplus
    /// arguments fall to a trailing MULTIPLE parameter.
    pub fn parameter_for(&self, index: usize) -> Option<&TemplateParameter> {
        self.template_parameters.get(index).or_else(|| {
            self.template_parameters
                .last()
                .filter(|parameter| parameter.flags.contains(ParameterFlags::MULTIPLE))
        })
    }
    pub fn has_qualifier(&self, qualifier: Qualifier) -> bool {
        match &self.body {
            TypeBody::BuiltIn(builtin) => builtin.qualifiers.contains(&qualifier),
            _ => false,
        }
    }
}

// ------------- TypeUsage -------------
/// A structural reason a type cannot simply disappear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeUsage {
    UsedInFieldType {
        record: TypeHandle,
        field: String,
        paths: Vec<Vec<usize>>,
    },
    IsBaseTypeOf {
        child: TypeHandle,
    },
    HasDataInStore {
        store: String,
        roots: Vec<String>,
    },
}

impl TypeUsage {
    /// Stored data never blocks a delete; it is removed along with the type.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, TypeUsage::HasDataInStore { .. })
    }
}
