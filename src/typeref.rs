//! Parsing of textual type references.
//!
//! The grammar lives in `typeref.pest`. Names are resolved against a
//! [`TypeRegistry`] while the tree is built, so the result only ever holds
//! live handles. Argument counts and qualifiers are left to the validator.

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::construct::{TemplateArgument, TypeReference};
use crate::error::{Result, TypewrightError};
use crate::registry::TypeRegistry;

#[derive(Parser)]
#[grammar = "typeref.pest"]
struct TypeReferenceParser;

pub fn parse_type_reference(registry: &TypeRegistry, text: &str) -> Result<TypeReference> {
    let mut pairs = TypeReferenceParser::parse(Rule::reference, text).map_err(|e| {
        let position = match e.location {
            InputLocation::Pos(position) => position,
            InputLocation::Span((start, _)) => start,
        };
        TypewrightError::Parse {
            message: e.variant.message().to_string(),
            position,
        }
    })?;
    let type_reference = pairs
        .next()
        .and_then(|reference| reference.into_inner().next())
        .filter(|pair| pair.as_rule() == Rule::type_reference)
        .ok_or_else(|| TypewrightError::Parse {
            message: "expected a type".into(),
            position: 0,
        })?;
    build(registry, type_reference)
}

fn build(registry: &TypeRegistry, pair: Pair<Rule>) -> Result<TypeReference> {
    let position = pair.as_span().start();
    let mut inner = pair.into_inner();
    let name = inner.next().map(|identifier| identifier.as_str()).unwrap_or_default();
    let handle = registry.resolve(name).ok_or_else(|| TypewrightError::Parse {
        message: format!("unknown type '{}'", name),
        position,
    })?;
    let mut arguments = Vec::new();
    if let Some(argument_list) = inner.next() {
        for argument in argument_list.into_inner() {
            let argument_position = argument.as_span().start();
            match argument.as_rule() {
                Rule::size => {
                    let size = argument.as_str().parse::<u64>().map_err(|e| TypewrightError::Parse {
                        message: format!("invalid size '{}': {}", argument.as_str(), e),
                        position: argument_position,
                    })?;
                    arguments.push(TemplateArgument::Size(size));
                }
                Rule::type_reference => arguments.push(TemplateArgument::Type(build(registry, argument)?)),
                rule => {
                    return Err(TypewrightError::Invariant(format!(
                        "unexpected {:?} in template argument list",
                        rule
                    )));
                }
            }
        }
    }
    Ok(TypeReference::with_arguments(handle, arguments))
}
