// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

/// Schemas describing the attributes of a port
pub mod schema;
/// Attribute types and values
pub mod value;

pub use schema::{Attribute, Schema, SchemaRef};
pub use value::{AttributeType, Value};

use crate::error::{Error, OperonResult};
use std::fmt;

/// Out-of-band control marker that travels in order with the tuples of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punctuation {
    /// Every tuple before the marker belongs to the preceding window
    WindowMarker,
    /// End of stream, terminal for the port it appears on
    FinalMarker,
}

impl fmt::Display for Punctuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Punctuation::WindowMarker => f.write_str("WINDOW_MARKER"),
            Punctuation::FinalMarker => f.write_str("FINAL_MARKER"),
        }
    }
}

/// An Enum containing everything that may flow through a port
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Tuple(Tuple),
    Punctuation(Punctuation),
}

impl StreamEvent {
    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Punctuation(Punctuation::FinalMarker))
    }
}

/// An immutable record conforming to the schema of the port it travels on
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: SchemaRef,
    values: Vec<Value>,
}

impl Tuple {
    /// Creates a Tuple from positional values
    ///
    /// Used by runtimes that decode inbound tuples. Fails unless there is
    /// exactly one value of the declared type per attribute.
    pub fn new(schema: SchemaRef, values: Vec<Value>) -> OperonResult<Tuple> {
        if values.len() != schema.len() {
            return Err(Error::Schema {
                msg: format!(
                    "expected {} values for {} but got {}",
                    schema.len(),
                    schema,
                    values.len()
                ),
            });
        }
        for (attr, value) in schema.attributes().iter().zip(values.iter()) {
            if attr.ty != value.attribute_type() {
                return Err(Error::Schema {
                    msg: format!(
                        "attribute {} is {} but the value is {}",
                        attr.name,
                        attr.ty,
                        value.attribute_type()
                    ),
                });
            }
        }
        Ok(Tuple { schema, values })
    }

    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    #[inline]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate over attribute declarations paired with their values
    pub fn attributes(&self) -> impl Iterator<Item = (&Attribute, &Value)> {
        self.schema.attributes().iter().zip(self.values.iter())
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        ty: AttributeType,
        f: impl FnOnce(&'a Value) -> Option<T>,
    ) -> OperonResult<T> {
        match self.get(name) {
            Some(v) => f(v).ok_or_else(|| Error::Schema {
                msg: format!(
                    "attribute {} is {} not {}",
                    name,
                    v.attribute_type(),
                    ty
                ),
            }),
            None => Err(Error::Schema {
                msg: format!("no attribute {} in {}", name, self.schema),
            }),
        }
    }

    pub fn get_bool(&self, name: &str) -> OperonResult<bool> {
        self.typed(name, AttributeType::Boolean, Value::as_bool)
    }

    pub fn get_i32(&self, name: &str) -> OperonResult<i32> {
        self.typed(name, AttributeType::Int32, Value::as_i32)
    }

    pub fn get_i64(&self, name: &str) -> OperonResult<i64> {
        self.typed(name, AttributeType::Int64, Value::as_i64)
    }

    pub fn get_u32(&self, name: &str) -> OperonResult<u32> {
        self.typed(name, AttributeType::UInt32, Value::as_u32)
    }

    pub fn get_u64(&self, name: &str) -> OperonResult<u64> {
        self.typed(name, AttributeType::UInt64, Value::as_u64)
    }

    pub fn get_f64(&self, name: &str) -> OperonResult<f64> {
        self.typed(name, AttributeType::Float64, Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> OperonResult<&str> {
        self.typed(name, AttributeType::RString, Value::as_str)
    }

    pub fn get_blob(&self, name: &str) -> OperonResult<&[u8]> {
        self.typed(name, AttributeType::Blob, Value::as_blob)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (attr, value)) in self.attributes().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", attr.name, value)?;
        }
        f.write_str("}")
    }
}

/// A mutable tuple under construction for a specific output port
///
/// Every attribute starts out with the default of its type, so a submitted
/// tuple always carries a value for each attribute of the port schema.
/// Ownership moves to the port on submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTuple {
    schema: SchemaRef,
    values: Vec<Value>,
}

impl OutputTuple {
    pub(crate) fn new(schema: SchemaRef) -> Self {
        let values = schema
            .attributes()
            .iter()
            .map(|a| a.ty.default_value())
            .collect();
        OutputTuple { schema, values }
    }

    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Sets an attribute by name
    ///
    /// The value must have the declared type of the attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> OperonResult<&mut Self> {
        match self.schema.index_of(name) {
            Some(i) => self.set_by_index(i, value),
            None => Err(Error::Schema {
                msg: format!("no attribute {} in {}", name, self.schema),
            }),
        }
    }

    /// Sets an attribute by position
    pub fn set_by_index(&mut self, index: usize, value: impl Into<Value>) -> OperonResult<&mut Self> {
        let value = value.into();
        let attr = match self.schema.attributes().get(index) {
            Some(attr) => attr,
            None => {
                return Err(Error::Schema {
                    msg: format!("no attribute at position {} in {}", index, self.schema),
                })
            }
        };
        if attr.ty != value.attribute_type() {
            return Err(Error::Schema {
                msg: format!(
                    "cannot assign {} to attribute {} of type {}",
                    value.attribute_type(),
                    attr.name,
                    attr.ty
                ),
            });
        }
        self.values[index] = value;
        Ok(self)
    }

    /// Copies every attribute of `tuple` whose name and type match an attribute
    /// of this tuple, and returns how many were copied
    ///
    /// Attributes without a match keep their current value.
    pub fn assign(&mut self, tuple: &Tuple) -> usize {
        let mut copied = 0;
        for (attr, value) in tuple.attributes() {
            if let Some(i) = self.schema.index_of(&attr.name) {
                if self.schema.attributes()[i].ty == attr.ty {
                    self.values[i] = value.clone();
                    copied += 1;
                }
            }
        }
        copied
    }

    #[inline]
    pub(crate) fn into_tuple(self) -> Tuple {
        Tuple {
            schema: self.schema,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_schema() -> SchemaRef {
        Schema::shared(vec![
            ("id", AttributeType::Int64),
            ("value", AttributeType::RString),
            ("score", AttributeType::Float64),
        ])
        .unwrap()
    }

    #[test]
    fn tuple_new_validates_values() {
        let schema = input_schema();
        let t = Tuple::new(
            schema.clone(),
            vec![Value::Int64(1), "a".into(), Value::Float64(0.5)],
        )
        .unwrap();
        assert_eq!(t.get_i64("id").unwrap(), 1);
        assert_eq!(t.get_str("value").unwrap(), "a");
        assert!(t.get_i32("id").is_err());
        assert!(t.get_u64("missing").is_err());
        assert_eq!(t.to_string(), "{id: 1, value: \"a\", score: 0.5}");

        assert!(Tuple::new(schema.clone(), vec![Value::Int64(1)]).is_err());
        assert!(Tuple::new(
            schema,
            vec![Value::Int32(1), "a".into(), Value::Float64(0.5)]
        )
        .is_err());
    }

    #[test]
    fn output_tuple_starts_with_defaults() {
        let out = OutputTuple::new(input_schema());
        assert_eq!(out.get("id"), Some(&Value::Int64(0)));
        assert_eq!(out.get("value"), Some(&Value::RString(String::new())));
        let t = out.into_tuple();
        assert_eq!(t.values().len(), 3);
    }

    #[test]
    fn output_tuple_set_checks_types() {
        let mut out = OutputTuple::new(input_schema());
        out.set("id", 5i64).unwrap().set("value", "x").unwrap();
        assert_eq!(out.get("id"), Some(&Value::Int64(5)));
        assert!(out.set("id", "five").is_err());
        assert!(out.set("unknown", 1i64).is_err());
        assert!(out.set_by_index(9, 1i64).is_err());
    }

    #[test]
    fn assign_copies_matching_attributes_only() {
        let input = Tuple::new(
            input_schema(),
            vec![Value::Int64(1), "a".into(), Value::Float64(2.0)],
        )
        .unwrap();
        // `score` has a different type and `extra` does not exist on the input
        let out_schema = Schema::shared(vec![
            ("value", AttributeType::RString),
            ("id", AttributeType::Int64),
            ("score", AttributeType::Int32),
            ("extra", AttributeType::Boolean),
        ])
        .unwrap();
        let mut out = OutputTuple::new(out_schema);
        assert_eq!(out.assign(&input), 2);
        assert_eq!(out.get("id"), Some(&Value::Int64(1)));
        assert_eq!(out.get("value"), Some(&Value::RString("a".into())));
        assert_eq!(out.get("score"), Some(&Value::Int32(0)));
        assert_eq!(out.get("extra"), Some(&Value::Boolean(false)));
    }
}
