//! Conversion of stored values between types.
//!
//! Conversions are looked up in a sparse matrix keyed by the (from, to)
//! pair of built-in kinds. Anything without an entry is reset to the default
//! of the target type instead of failing: a migration is best effort and
//! never aborts half way.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;
use serde_json::{Value, json};

use crate::construct::{BuiltinKind, TypeReference};
use crate::datatype::initialize;
use crate::registry::{OtherHasher, TypeRegistry};

/// What happens to a value when its type changes. Ordered from harmless to
/// worst, so the worst outcome of several conversions is their maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConversionResult {
    Preserved,
    Corrupted,
    Lost,
    Impossible,
}

type Converter = fn(&Value, BuiltinKind) -> Value;

lazy_static! {
    static ref CONVERSIONS: HashMap<(BuiltinKind, BuiltinKind), Converter, OtherHasher> = {
        let mut conversions: HashMap<(BuiltinKind, BuiltinKind), Converter, OtherHasher> = HashMap::default();
        let mut scalars = BuiltinKind::NUMERIC.to_vec();
        scalars.push(BuiltinKind::Bool);
        for &from in &scalars {
            for &to in &scalars {
                if from != to {
                    conversions.insert((from, to), cast as Converter);
                }
            }
            conversions.insert((from, BuiltinKind::String), render as Converter);
            conversions.insert((BuiltinKind::String, from), parse as Converter);
        }
        conversions
    };
}

pub fn has_conversion(from: BuiltinKind, to: BuiltinKind) -> bool {
    CONVERSIONS.contains_key(&(from, to))
}

/// Predicts the outcome of converting a value of type `from` to `to`.
/// Registered conversions are always reported as [`ConversionResult::Corrupted`];
/// no attempt is made to prove that a particular value survives.
pub fn classify(registry: &TypeRegistry, from: &TypeReference, to: &TypeReference) -> ConversionResult {
    if from == to || registry.is_void(from.handle) {
        return ConversionResult::Preserved;
    }
    if registry.is_void(to.handle) {
        return ConversionResult::Lost;
    }
    match (registry.builtin_kind(from.handle), registry.builtin_kind(to.handle)) {
        (Some(a), Some(b)) if has_conversion(a, b) => ConversionResult::Corrupted,
        (Some(_), Some(_)) => ConversionResult::Lost,
        _ => ConversionResult::Impossible,
    }
}

/// Rewrites `value` from type `from` to type `to` and reports what
/// happened to it. Pairs without a registered conversion end up holding the
/// default of `to`.
pub fn convert(registry: &TypeRegistry, from: &TypeReference, to: &TypeReference, value: &mut Value) -> ConversionResult {
    let result = classify(registry, from, to);
    if from == to {
        return result;
    }
    let converter = match (registry.builtin_kind(from.handle), registry.builtin_kind(to.handle)) {
        (Some(a), Some(b)) => CONVERSIONS.get(&(a, b)).map(|converter| (*converter, b)),
        _ => None,
    };
    *value = match converter {
        Some((converter, target)) => converter(value, target),
        None => initialize(registry, to),
    };
    result
}

// ------------- Scalars -------------
#[derive(Clone, Copy, Debug, PartialEq)]
enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn read(value: &Value) -> Scalar {
        match value {
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(number) => {
                if let Some(i) = number.as_i64() {
                    Scalar::Signed(i)
                } else if let Some(u) = number.as_u64() {
                    Scalar::Unsigned(u)
                } else {
                    Scalar::Float(number.as_f64().unwrap_or(0.0))
                }
            }
            _ => Scalar::Signed(0),
        }
    }
    fn as_i64(&self) -> i64 {
        match *self {
            Scalar::Signed(i) => i,
            Scalar::Unsigned(u) => u as i64,
            Scalar::Float(f) => f as i64,
            Scalar::Bool(b) => b as i64,
        }
    }
    fn as_u64(&self) -> u64 {
        match *self {
            Scalar::Signed(i) => i as u64,
            Scalar::Unsigned(u) => u,
            Scalar::Float(f) => f as u64,
            Scalar::Bool(b) => b as u64,
        }
    }
    fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Signed(i) => i as f64,
            Scalar::Unsigned(u) => u as f64,
            Scalar::Float(f) => f,
            Scalar::Bool(b) => b as u8 as f64,
        }
    }
    fn as_bool(&self) -> bool {
        match *self {
            Scalar::Signed(i) => i != 0,
            Scalar::Unsigned(u) => u != 0,
            Scalar::Float(f) => f != 0.0,
            Scalar::Bool(b) => b,
        }
    }
    /// Casts the way a static cast would: integers wrap, floats truncate and saturate.
    fn write(&self, to: BuiltinKind) -> Value {
        match to {
            BuiltinKind::I8 => json!(self.as_i64() as i8),
            BuiltinKind::I16 => json!(self.as_i64() as i16),
            BuiltinKind::I32 => json!(self.as_i64() as i32),
            BuiltinKind::I64 => json!(self.as_i64()),
            BuiltinKind::U8 => json!(self.as_u64() as u8),
            BuiltinKind::U16 => json!(self.as_u64() as u16),
            BuiltinKind::U32 => json!(self.as_u64() as u32),
            BuiltinKind::U64 => json!(self.as_u64()),
            BuiltinKind::F32 => finite(self.as_f64() as f32 as f64),
            BuiltinKind::F64 => finite(self.as_f64()),
            BuiltinKind::Bool => json!(self.as_bool()),
            _ => Value::Null,
        }
    }
    fn render(&self) -> String {
        match *self {
            Scalar::Signed(i) => i.to_string(),
            Scalar::Unsigned(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

// JSON has no room for NaN or infinities
fn finite(f: f64) -> Value {
    if f.is_finite() { json!(f) } else { json!(0.0) }
}

fn cast(value: &Value, to: BuiltinKind) -> Value {
    Scalar::read(value).write(to)
}

fn render(value: &Value, _to: BuiltinKind) -> Value {
    Value::String(Scalar::read(value).render())
}

/// Best effort: text that does not parse becomes zero.
fn parse(value: &Value, to: BuiltinKind) -> Value {
    let text = value.as_str().unwrap_or_default().trim();
    let scalar = if to == BuiltinKind::Bool {
        match text {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => text.parse::<f64>().map(Scalar::Float).unwrap_or(Scalar::Bool(false)),
        }
    } else if let Ok(i) = text.parse::<i64>() {
        Scalar::Signed(i)
    } else if let Ok(u) = text.parse::<u64>() {
        Scalar::Unsigned(u)
    } else {
        Scalar::Float(text.parse::<f64>().unwrap_or(0.0))
    };
    scalar.write(to)
}
