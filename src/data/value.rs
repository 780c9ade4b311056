// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use serde::Deserialize;
use std::fmt;

/// The closed set of attribute types a [Schema](super::Schema) may declare
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Boolean,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float64,
    RString,
    Blob,
}

impl AttributeType {
    /// The explicit default a freshly created output tuple holds for this type
    pub fn default_value(self) -> Value {
        match self {
            AttributeType::Boolean => Value::Boolean(false),
            AttributeType::Int32 => Value::Int32(0),
            AttributeType::Int64 => Value::Int64(0),
            AttributeType::UInt32 => Value::UInt32(0),
            AttributeType::UInt64 => Value::UInt64(0),
            AttributeType::Float64 => Value::Float64(0.0),
            AttributeType::RString => Value::RString(String::new()),
            AttributeType::Blob => Value::Blob(Vec::new()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Boolean => "boolean",
            AttributeType::Int32 => "int32",
            AttributeType::Int64 => "int64",
            AttributeType::UInt32 => "uint32",
            AttributeType::UInt64 => "uint64",
            AttributeType::Float64 => "float64",
            AttributeType::RString => "rstring",
            AttributeType::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float64(f64),
    RString(String),
    Blob(Vec<u8>),
}

impl Value {
    #[inline]
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Value::Boolean(_) => AttributeType::Boolean,
            Value::Int32(_) => AttributeType::Int32,
            Value::Int64(_) => AttributeType::Int64,
            Value::UInt32(_) => AttributeType::UInt32,
            Value::UInt64(_) => AttributeType::UInt64,
            Value::Float64(_) => AttributeType::Float64,
            Value::RString(_) => AttributeType::RString,
            Value::Blob(_) => AttributeType::Blob,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::RString(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::RString(v) => write!(f, "{:?}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f64 => Float64,
    String => RString,
    Vec<u8> => Blob,
}

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::RString(v.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_their_type() {
        let types = [
            AttributeType::Boolean,
            AttributeType::Int32,
            AttributeType::Int64,
            AttributeType::UInt32,
            AttributeType::UInt64,
            AttributeType::Float64,
            AttributeType::RString,
            AttributeType::Blob,
        ];
        for ty in types.iter() {
            assert_eq!(ty.default_value().attribute_type(), *ty);
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from("a"), Value::RString("a".to_string()));
        assert_eq!(Value::from(7i64).as_i64(), Some(7));
        assert_eq!(Value::from(7i64).as_u64(), None);
        assert_eq!(Value::from(vec![1u8, 2]).as_blob(), Some(&[1u8, 2][..]));
        assert_eq!(Value::from(1.5f64).to_string(), "1.5");
    }
}
