//! Pure checks run before any mutation.
//!
//! Nothing in here changes state, so an editor may call these as often as
//! it likes to preview why a change would be refused. Every failure is a
//! [`TypewrightError::Invalid`] carrying a message meant for the user.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
// used to check identifier syntax
use regex::Regex;

use crate::construct::{
    FieldFlags, Qualifier, RecordFlags, TemplateArgument, TemplateParameter, TypeHandle, TypeReference,
    TypeVariant,
};
use crate::datatype::default_size;
use crate::error::{Result, TypewrightError};
use crate::registry::{OtherHasher, TypeRegistry};

/// Largest element count an `array<T,N>` may declare.
pub const MAX_ARRAY_SIZE: u64 = 1 << 16;
/// Largest number of values the default of a single type may consist of.
pub const MAX_DEFAULT_VALUES: u64 = 1 << 20;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    // Names end up in generated C++ and C# sources, so keywords of both are off limits.
    static ref KEYWORDS: HashSet<&'static str, OtherHasher> = [
        // C++
        "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
        "case", "catch", "char", "char8_t", "char16_t", "char32_t", "class", "compl", "concept",
        "const", "consteval", "constexpr", "constinit", "const_cast", "continue", "co_await",
        "co_return", "co_yield", "decltype", "default", "delete", "do", "double", "dynamic_cast",
        "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto",
        "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq",
        "nullptr", "operator", "or", "or_eq", "private", "protected", "public", "register",
        "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
        "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
        "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
        "virtual", "void", "volatile", "wchar_t", "while", "xor", "xor_eq",
        // C#
        "abstract", "as", "base", "byte", "checked", "decimal", "delegate", "event", "fixed",
        "foreach", "implicit", "in", "interface", "internal", "is", "lock", "null", "object",
        "out", "override", "params", "readonly", "ref", "sbyte", "sealed", "stackalloc", "string",
        "uint", "ulong", "unchecked", "unsafe", "ushort", "var",
    ]
    .into_iter()
    .collect();
}

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

// ------------- Identifiers -------------
pub fn validate_identifier(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(TypewrightError::invalid("A name cannot be empty"));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(TypewrightError::invalid(format!(
            "'{}' must start with a letter or an underscore",
            name
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(TypewrightError::invalid(format!(
            "'{}' may only contain letters, digits and underscores",
            name
        )));
    }
    if is_keyword(name) {
        return Err(TypewrightError::invalid(format!("'{}' is a reserved keyword", name)));
    }
    if name.contains("__") {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot contain a double underscore",
            name
        )));
    }
    if name.len() > 1 && first == '_' && name[1..].starts_with(|c: char| c.is_ascii_uppercase()) {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot start with an underscore followed by an uppercase letter",
            name
        )));
    }
    Ok(())
}

// ------------- Template arguments -------------
pub fn validate_template_argument(
    registry: &TypeRegistry,
    argument: &TemplateArgument,
    parameter: &TemplateParameter,
) -> Result<()> {
    let reference = match (parameter.qualifier, argument) {
        (Qualifier::Size, TemplateArgument::Size(size)) if *size > MAX_ARRAY_SIZE => {
            return Err(TypewrightError::invalid(format!(
                "Parameter {} is {}, but at most {} is allowed",
                parameter.name, size, MAX_ARRAY_SIZE
            )));
        }
        (Qualifier::Size, TemplateArgument::Size(_)) => return Ok(()),
        (Qualifier::Size, TemplateArgument::Type(reference)) => {
            return Err(TypewrightError::invalid(format!(
                "Parameter {} expects a size, but got the type '{}'",
                parameter.name,
                registry.render(reference)
            )));
        }
        (_, TemplateArgument::Size(size)) => {
            return Err(TypewrightError::invalid(format!(
                "Parameter {} expects a type, but got the number {}",
                parameter.name, size
            )));
        }
        (_, TemplateArgument::Type(reference)) => reference,
    };
    let Some(definition) = registry.get(reference.handle) else {
        return Err(TypewrightError::invalid(format!(
            "Parameter {} refers to a type that no longer exists",
            parameter.name
        )));
    };
    if registry.satisfies(reference.handle, parameter.qualifier) {
        return Ok(());
    }
    let name = definition.name();
    let variant = definition.variant();
    let reason = match parameter.qualifier {
        Qualifier::Struct => format!("requires a struct, but '{}' is a {}", name, variant),
        Qualifier::Class => format!("requires a class, but '{}' is a {}", name, variant),
        Qualifier::Enum => format!("requires an enum, but '{}' is a {}", name, variant),
        Qualifier::NotClass => format!("does not accept classes, but '{}' is a class", name),
        Qualifier::Integral => format!("requires an integral type, but '{}' is not one", name),
        Qualifier::Floating => format!("requires a floating point type, but '{}' is not one", name),
        Qualifier::Pointer => format!("requires ref<> or own<>, but got '{}'", name),
        Qualifier::Scalar => format!(
            "requires a number, bool, string or enum, but '{}' is a {}",
            name, variant
        ),
        Qualifier::AnyType | Qualifier::Size => format!("does not accept '{}'", name),
    };
    Err(TypewrightError::invalid(format!("Parameter {} {}", parameter.name, reason)))
}

/// Argument counts and qualifiers, checked all the way down.
pub fn validate_type_reference(registry: &TypeRegistry, reference: &TypeReference) -> Result<()> {
    let definition = registry
        .get(reference.handle)
        .ok_or_else(|| TypewrightError::invalid(format!("Type {} no longer exists", reference.handle)))?;
    let parameters = definition.template_parameters();
    if reference.arguments.len() < parameters.len() {
        return Err(TypewrightError::invalid(format!(
            "'{}' expects {} template argument(s), but {} were given",
            definition.name(),
            parameters.len(),
            reference.arguments.len()
        )));
    }
    for (index, argument) in reference.arguments.iter().enumerate() {
        let Some(parameter) = definition.parameter_for(index) else {
            return Err(TypewrightError::invalid(format!(
                "'{}' takes at most {} template argument(s), but {} were given",
                definition.name(),
                parameters.len(),
                reference.arguments.len()
            )));
        };
        validate_template_argument(registry, argument, parameter)?;
        if let TemplateArgument::Type(inner) = argument {
            validate_type_reference(registry, inner)?;
        }
    }
    Ok(())
}

/// Refuses types whose default value alone would be too large to build.
pub fn validate_default_size(registry: &TypeRegistry, reference: &TypeReference) -> Result<()> {
    if default_size(registry, reference) > MAX_DEFAULT_VALUES {
        return Err(TypewrightError::invalid(format!(
            "'{}' would hold more than {} values",
            registry.render(reference),
            MAX_DEFAULT_VALUES
        )));
    }
    Ok(())
}

// ------------- Records -------------
/// Passes for structs and classes and reports which of the two it is.
pub fn validate_record(registry: &TypeRegistry, record: TypeHandle) -> Result<TypeVariant> {
    let definition = registry.definition(record)?;
    if !definition.is_record() {
        return Err(TypewrightError::invalid(format!(
            "'{}' is a {}, not a struct or class",
            definition.name(),
            definition.variant()
        )));
    }
    Ok(definition.variant())
}

pub fn validate_record_base_type(
    registry: &TypeRegistry,
    record: TypeHandle,
    candidate: Option<&TypeReference>,
) -> Result<()> {
    let variant = validate_record(registry, record)?;
    let Some(candidate) = candidate else {
        return Ok(());
    };
    let base = registry
        .get(candidate.handle)
        .ok_or_else(|| TypewrightError::invalid("The base type no longer exists"))?;
    let record_name = registry.name_of(record);
    if base.variant() != variant {
        return Err(TypewrightError::invalid(format!(
            "The {} '{}' cannot derive from the {} '{}'",
            variant,
            record_name,
            base.variant(),
            base.name()
        )));
    }
    validate_type_reference(registry, candidate)?;
    if registry.is_parent_of(record, candidate.handle) {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot derive from '{}': it would become its own ancestor",
            record_name,
            base.name()
        )));
    }
    let inherited: HashMap<String, TypeHandle> = registry
        .all_fields(candidate.handle)
        .into_iter()
        .map(|(owner, field)| (field.name.clone(), owner))
        .collect();
    let mut owners = vec![record];
    owners.extend(registry.descendants_of(record));
    let mut shadowed = Vec::new();
    for owner in owners {
        let Some(own) = registry.get(owner).and_then(|definition| definition.record()) else {
            continue;
        };
        for field in &own.fields {
            if let Some(inherited_owner) = inherited.get(&field.name) {
                shadowed.push(format!(
                    "  {}.{} would shadow {}.{}",
                    registry.name_of(owner),
                    field.name,
                    registry.name_of(*inherited_owner),
                    field.name
                ));
            }
        }
    }
    if !shadowed.is_empty() {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot derive from '{}':\n{}",
            record_name,
            base.name(),
            shadowed.join("\n")
        )));
    }
    // the base is held by value, so it must not contain the record either
    let mut open = vec![record];
    open.extend(registry.descendants_of(record));
    let mut closed = HashSet::new();
    if let Some(offender) = find_open(registry, candidate, &open, &mut closed) {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot derive from '{}': it would contain '{}' itself",
            record_name,
            base.name(),
            registry.name_of(offender)
        )));
    }
    Ok(())
}

pub fn validate_field_type(
    registry: &TypeRegistry,
    record: TypeHandle,
    candidate: Option<&TypeReference>,
) -> Result<()> {
    validate_record(registry, record)?;
    let Some(candidate) = candidate else {
        return Err(TypewrightError::invalid("A field needs a type"));
    };
    validate_type_reference(registry, candidate)?;
    // the record itself and everything deriving from it are still open
    let mut open = vec![record];
    open.extend(registry.descendants_of(record));
    let mut closed = HashSet::new();
    if let Some(offender) = find_open(registry, candidate, &open, &mut closed) {
        return Err(TypewrightError::invalid(format!(
            "'{}' cannot be stored by value in '{}': it would contain '{}' itself. Use ref<> or own<> instead",
            registry.render(candidate),
            registry.name_of(record),
            registry.name_of(offender)
        )));
    }
    Ok(())
}

/// Walks everything `reference` holds by value and returns the first open
/// type found. Slots that may be incomplete are not entered.
fn find_open(
    registry: &TypeRegistry,
    reference: &TypeReference,
    open: &[TypeHandle],
    closed: &mut HashSet<TypeHandle>,
) -> Option<TypeHandle> {
    if open.contains(&reference.handle) {
        return Some(reference.handle);
    }
    let definition = registry.get(reference.handle)?;
    for (index, argument) in reference.arguments.iter().enumerate() {
        let TemplateArgument::Type(inner) = argument else {
            continue;
        };
        if definition.parameter_for(index).is_some_and(TemplateParameter::must_be_complete) {
            if let Some(offender) = find_open(registry, inner, open, closed) {
                return Some(offender);
            }
        }
    }
    if definition.is_record() && closed.insert(reference.handle) {
        for (_, field) in registry.all_fields(reference.handle) {
            if let Some(offender) = find_open(registry, &field.field_type, open, closed) {
                return Some(offender);
            }
        }
    }
    None
}

// ------------- Names -------------
pub fn validate_type_name(registry: &TypeRegistry, handle: TypeHandle, new_name: &str) -> Result<()> {
    validate_identifier(new_name)?;
    match registry.resolve(new_name) {
        Some(existing) if existing == handle => Ok(()),
        Some(existing) if registry.builtin_kind(existing).is_some() => Err(TypewrightError::invalid(format!(
            "'{}' is the name of a built-in type",
            new_name
        ))),
        Some(_) => Err(TypewrightError::invalid(format!(
            "A type named '{}' already exists",
            new_name
        ))),
        None => Ok(()),
    }
}

/// `current` is the field being renamed, or `None` for a field about to be added.
pub fn validate_field_name(
    registry: &TypeRegistry,
    record: TypeHandle,
    current: Option<&str>,
    new_name: &str,
) -> Result<()> {
    validate_record(registry, record)?;
    validate_identifier(new_name)?;
    for (owner, field) in registry.all_fields(record) {
        if owner == record && Some(field.name.as_str()) == current {
            continue;
        }
        if field.name == new_name {
            return Err(if owner == record {
                TypewrightError::invalid(format!(
                    "'{}' already has a field named '{}'",
                    registry.name_of(record),
                    new_name
                ))
            } else {
                TypewrightError::invalid(format!(
                    "'{}' already inherits a field named '{}' from '{}'",
                    registry.name_of(record),
                    new_name,
                    registry.name_of(owner)
                ))
            });
        }
    }
    for descendant in registry.descendants_of(record) {
        let declares = registry
            .get(descendant)
            .and_then(|definition| definition.record())
            .is_some_and(|own| own.field(new_name).is_some());
        if declares {
            return Err(TypewrightError::invalid(format!(
                "'{}' derives from '{}' and already has a field named '{}'",
                registry.name_of(descendant),
                registry.name_of(record),
                new_name
            )));
        }
    }
    Ok(())
}

pub fn validate_enumerator_name(
    registry: &TypeRegistry,
    enumeration: TypeHandle,
    index: Option<usize>,
    new_name: &str,
) -> Result<()> {
    let definition = registry.definition(enumeration)?;
    let Some(body) = definition.enumeration() else {
        return Err(TypewrightError::invalid(format!("'{}' is not an enum", definition.name())));
    };
    validate_identifier(new_name)?;
    let taken = body
        .enumerators
        .iter()
        .enumerate()
        .any(|(position, enumerator)| Some(position) != index && enumerator.name == new_name);
    if taken {
        return Err(TypewrightError::invalid(format!(
            "'{}' already has an enumerator named '{}'",
            definition.name(),
            new_name
        )));
    }
    Ok(())
}

// ------------- Flags -------------
pub fn validate_field_flags(
    registry: &TypeRegistry,
    record: TypeHandle,
    field_type: &TypeReference,
    flags: FieldFlags,
) -> Result<()> {
    let variant = validate_record(registry, record)?;
    let record_flags = registry
        .get(record)
        .and_then(|definition| definition.record())
        .map(|own| own.flags)
        .unwrap_or_default();
    check_field_flags(registry, variant, record_flags, field_type, flags)
}

fn check_field_flags(
    registry: &TypeRegistry,
    variant: TypeVariant,
    record_flags: RecordFlags,
    field_type: &TypeReference,
    flags: FieldFlags,
) -> Result<()> {
    if variant != TypeVariant::Class {
        for (flag, label) in [
            (FieldFlags::PRIVATE, "private access"),
            (FieldFlags::GETTER, "a getter"),
            (FieldFlags::SETTER, "a setter"),
        ] {
            if flags.contains(flag) {
                return Err(TypewrightError::invalid(format!("Only class fields can have {}", label)));
            }
        }
    }
    for (flag, label) in [(FieldFlags::GETTER, "getter"), (FieldFlags::SETTER, "setter")] {
        if flags.contains(flag) && !flags.contains(FieldFlags::PRIVATE) {
            return Err(TypewrightError::invalid(format!(
                "A {} only makes sense on a private field",
                label
            )));
        }
    }
    if flags.intersects(FieldFlags::UNIQUE | FieldFlags::INDEXED) {
        if variant != TypeVariant::Struct || !record_flags.contains(RecordFlags::TABLE) {
            return Err(TypewrightError::invalid(
                "Only fields of table structs can be unique or indexed",
            ));
        }
        if !registry.satisfies(field_type.handle, Qualifier::Scalar) {
            return Err(TypewrightError::invalid(format!(
                "Unique and indexed fields need a scalar type, but '{}' is not one",
                registry.render(field_type)
            )));
        }
    }
    Ok(())
}

/// Record flags, and whether every own field stays legal under them.
pub fn validate_record_flags(registry: &TypeRegistry, record: TypeHandle, flags: RecordFlags) -> Result<()> {
    let variant = validate_record(registry, record)?;
    if flags.contains(RecordFlags::TABLE) && variant != TypeVariant::Struct {
        return Err(TypewrightError::invalid("Only structs can be stored as tables"));
    }
    let own = registry
        .get(record)
        .and_then(|definition| definition.record())
        .map(|own| own.fields.as_slice())
        .unwrap_or_default();
    for field in own {
        check_field_flags(registry, variant, flags, &field.field_type, field.flags).map_err(|e| {
            TypewrightError::invalid(format!("Field '{}': {}", field.name, e))
        })?;
    }
    Ok(())
}
