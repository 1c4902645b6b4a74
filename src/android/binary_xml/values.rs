use super::{BinaryXmlError, BinaryXmlResult, StringPool, NO_ENTRY_INDEX};

const TYPE_NULL: u8 = 0x00;
const TYPE_REFERENCE: u8 = 0x01;
const TYPE_ATTRIBUTE: u8 = 0x02;
const TYPE_STRING: u8 = 0x03;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_DIMENSION: u8 = 0x05;
const TYPE_FRACTION: u8 = 0x06;
const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

pub(crate) const RES_VALUE_TRUE: u32 = 0xFFFF_FFFF;
pub(crate) const RES_VALUE_FALSE: u32 = 0x0000_0000;

/// `Res_value::dataType` of an attribute or cdata record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Reference,
    Attribute,
    String,
    Float,
    Dimension,
    Fraction,
    DynamicReference,
    IntDec,
    IntHex,
    IntBoolean,
    Other(u8),
}

impl From<u8> for ValueType {
    fn from(code: u8) -> Self {
        match code {
            TYPE_NULL => ValueType::Null,
            TYPE_REFERENCE => ValueType::Reference,
            TYPE_ATTRIBUTE => ValueType::Attribute,
            TYPE_STRING => ValueType::String,
            TYPE_FLOAT => ValueType::Float,
            TYPE_DIMENSION => ValueType::Dimension,
            TYPE_FRACTION => ValueType::Fraction,
            TYPE_DYNAMIC_REFERENCE => ValueType::DynamicReference,
            TYPE_INT_DEC => ValueType::IntDec,
            TYPE_INT_HEX => ValueType::IntHex,
            TYPE_INT_BOOLEAN => ValueType::IntBoolean,
            other => ValueType::Other(other),
        }
    }
}

impl ValueType {
    pub fn code(self) -> u8 {
        match self {
            ValueType::Null => TYPE_NULL,
            ValueType::Reference => TYPE_REFERENCE,
            ValueType::Attribute => TYPE_ATTRIBUTE,
            ValueType::String => TYPE_STRING,
            ValueType::Float => TYPE_FLOAT,
            ValueType::Dimension => TYPE_DIMENSION,
            ValueType::Fraction => TYPE_FRACTION,
            ValueType::DynamicReference => TYPE_DYNAMIC_REFERENCE,
            ValueType::IntDec => TYPE_INT_DEC,
            ValueType::IntHex => TYPE_INT_HEX,
            ValueType::IntBoolean => TYPE_INT_BOOLEAN,
            ValueType::Other(code) => code,
        }
    }
}

/// The payload of an attribute record before rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypedValue {
    pub value_type: ValueType,
    /// String pool index of the raw (source) value, `0xFFFFFFFF` when absent.
    pub raw_value: u32,
    /// Resource id, integer or string index depending on `value_type`.
    pub data: u32,
}

impl TypedValue {
    pub fn new(value_type: ValueType, raw_value: u32, data: u32) -> Self {
        TypedValue {
            value_type,
            raw_value,
            data,
        }
    }
}

/// Renders a typed value the way the manifest viewer displays it.
///
/// Floats, dimensions and fractions render as an empty string. Only string
/// values touch the pool; an unresolved index there is a structural error.
pub fn render_value(value: &TypedValue, strings: &StringPool) -> BinaryXmlResult<String> {
    let data = value.data;
    let text = match value.value_type {
        ValueType::Null => {
            if data == 0 {
                "<undefined>".to_string()
            } else {
                "<empty>".to_string()
            }
        }
        ValueType::Reference => format!("@res/0x{data:08X}"),
        ValueType::Attribute => format!("@attr/0x{data:08X}"),
        ValueType::String => strings
            .get(value.raw_value)
            .map(str::to_string)
            .ok_or_else(|| {
                BinaryXmlError::invalid(format!(
                    "String value references missing pool entry {}",
                    value.raw_value
                ))
            })?,
        ValueType::Float | ValueType::Dimension | ValueType::Fraction => String::new(),
        ValueType::DynamicReference => format!("@dyn/0x{data:08X}"),
        ValueType::IntDec => (data as i32).to_string(),
        ValueType::IntHex => format!("0x{data:08X}"),
        ValueType::IntBoolean => match data {
            RES_VALUE_TRUE => "true".to_string(),
            RES_VALUE_FALSE => "false".to_string(),
            _ => "unknown".to_string(),
        },
        ValueType::Other(_) => "unknown".to_string(),
    };
    Ok(text)
}

/// A caller supplied attribute value, typed the way `aapt` would compile it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestValue {
    String(String),
    Boolean(bool),
    Integer(i32),
    Hex(u32),
    Reference(u32),
}

impl ManifestValue {
    /// Infers the compiled type of a textual value.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed == "true" {
            ManifestValue::Boolean(true)
        } else if trimmed == "false" {
            ManifestValue::Boolean(false)
        } else if let Some(hex) = trimmed.strip_prefix("@0x").or_else(|| trimmed.strip_prefix("@0X")) {
            u32::from_str_radix(hex, 16)
                .map(ManifestValue::Reference)
                .unwrap_or_else(|_| ManifestValue::String(text.to_string()))
        } else if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
                .map(ManifestValue::Hex)
                .unwrap_or_else(|_| ManifestValue::String(text.to_string()))
        } else if let Ok(number) = trimmed.parse::<i32>() {
            ManifestValue::Integer(number)
        } else {
            ManifestValue::String(text.to_string())
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ManifestValue::String(_) => ValueType::String,
            ManifestValue::Boolean(_) => ValueType::IntBoolean,
            ManifestValue::Integer(_) => ValueType::IntDec,
            ManifestValue::Hex(_) => ValueType::IntHex,
            ManifestValue::Reference(_) => ValueType::Reference,
        }
    }

    /// Encodes the value; `string_index` is the pool index of a string value.
    pub(crate) fn encode(&self, string_index: Option<u32>) -> TypedValue {
        let value_type = self.value_type();
        match self {
            ManifestValue::String(_) => {
                let idx = string_index.unwrap_or(NO_ENTRY_INDEX);
                TypedValue::new(value_type, idx, idx)
            }
            ManifestValue::Boolean(flag) => {
                let data = if *flag { RES_VALUE_TRUE } else { RES_VALUE_FALSE };
                TypedValue::new(value_type, NO_ENTRY_INDEX, data)
            }
            ManifestValue::Integer(number) => {
                TypedValue::new(value_type, NO_ENTRY_INDEX, *number as u32)
            }
            ManifestValue::Hex(number) => TypedValue::new(value_type, NO_ENTRY_INDEX, *number),
            ManifestValue::Reference(id) => TypedValue::new(value_type, NO_ENTRY_INDEX, *id),
        }
    }
}

impl From<&str> for ManifestValue {
    fn from(value: &str) -> Self {
        ManifestValue::infer(value)
    }
}
