//! Typed ABI for host values.
//!
//! Typed calls declare the Rust type of an argument or result. A host
//! value is lowered into that type the way the module's ABI slot sees
//! it: values of the right kind are decoded with range checks, anything
//! else arrives as unit. Lowering a mistyped value therefore fails with
//! `invalid type: unit value, expected u32`, before any host callback
//! runs.

use serde::de::DeserializeOwned;
use serde::de::value::UnitDeserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Declared type of an ABI slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbiType {
    /// Unsigned 32-bit integer
    U32,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 64-bit integer
    U64,
    /// 64-bit float
    F64,
    /// Boolean
    Bool,
    /// String
    String,
    /// Any host value, passed through untouched
    Any,
}

impl AbiType {
    /// True when a host value of this kind can occupy the slot
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::U32 | Self::I32 | Self::U64 | Self::F64 => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::String => value.is_string(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::F64 => "f64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// A Rust type that can cross the boundary through a typed call
pub trait AbiParam: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The slot this type occupies
    const ABI_TYPE: AbiType;
}

impl AbiParam for u32 {
    const ABI_TYPE: AbiType = AbiType::U32;
}

impl AbiParam for i32 {
    const ABI_TYPE: AbiType = AbiType::I32;
}

impl AbiParam for u64 {
    const ABI_TYPE: AbiType = AbiType::U64;
}

impl AbiParam for f64 {
    const ABI_TYPE: AbiType = AbiType::F64;
}

impl AbiParam for bool {
    const ABI_TYPE: AbiType = AbiType::Bool;
}

impl AbiParam for String {
    const ABI_TYPE: AbiType = AbiType::String;
}

impl AbiParam for Value {
    const ABI_TYPE: AbiType = AbiType::Any;
}

/// ABI lowering and lifting errors
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// The slot received a value of another kind
    #[error("{0}")]
    Mismatch(#[from] serde::de::value::Error),

    /// The value has the right kind but does not fit the slot
    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

impl AbiType {
    fn is_integer(&self) -> bool {
        matches!(self, Self::U32 | Self::I32 | Self::U64)
    }
}

/// Lower a host value into a declared type
///
/// Integer slots take floats with no fractional part, since the host has
/// a single number type.
///
/// # Errors
///
/// Returns [`AbiError::Mismatch`] when the value is of another kind and
/// [`AbiError::Decode`] when it does not fit the slot
pub fn lower<T: AbiParam>(value: &Value) -> Result<T, AbiError> {
    if !T::ABI_TYPE.accepts(value) {
        return lower_unit();
    }
    match integral(T::ABI_TYPE, value) {
        Some(whole) => Ok(T::deserialize(&whole)?),
        None => Ok(T::deserialize(value)?),
    }
}

/// A whole float as an integer value, for integer slots
fn integral(slot: AbiType, value: &Value) -> Option<Value> {
    if !slot.is_integer() || value.is_i64() || value.is_u64() {
        return None;
    }
    let f = value.as_f64()?;
    if f.fract() != 0.0 || !f.is_finite() {
        return None;
    }
    if f >= 0.0 && f <= u64::MAX as f64 {
        Some(Value::from(f as u64))
    } else if f < 0.0 && f >= i64::MIN as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

/// Lower a slot that received nothing the ABI can represent
///
/// # Errors
///
/// Returns `invalid type: unit value, expected <type>` unless the
/// declared type accepts unit
pub fn lower_unit<T: AbiParam>() -> Result<T, AbiError> {
    Ok(T::deserialize(
        UnitDeserializer::<serde::de::value::Error>::new(),
    )?)
}

/// Lift a typed value back into a host value
///
/// # Errors
///
/// Returns the encoder error if the value cannot be represented
pub fn lift<T: AbiParam>(value: &T) -> Result<Value, AbiError> {
    Ok(serde_json::to_value(value)?)
}
