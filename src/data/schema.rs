// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use super::value::AttributeType;
use crate::error::{Error, OperonResult};
use fxhash::FxHashMap;
use std::{fmt, sync::Arc};

/// Shared reference to a [Schema]
pub type SchemaRef = Arc<Schema>;

/// A named and typed attribute of a [Schema]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
}

/// Ordered set of attributes that every tuple on a port conforms to
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: Vec<Attribute>,
    /// Attribute name to position
    index: FxHashMap<String, usize>,
}

impl Schema {
    /// Creates a Schema from `(name, type)` pairs
    ///
    /// Fails if an attribute name is empty or declared twice.
    pub fn new<I, S>(attributes: I) -> OperonResult<Schema>
    where
        I: IntoIterator<Item = (S, AttributeType)>,
        S: Into<String>,
    {
        let mut attrs = Vec::new();
        let mut index = FxHashMap::default();
        for (name, ty) in attributes {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::Schema {
                    msg: String::from("attribute names must not be empty"),
                });
            }
            if index.insert(name.clone(), attrs.len()).is_some() {
                return Err(Error::Schema {
                    msg: format!("attribute {} declared more than once", name),
                });
            }
            attrs.push(Attribute { name, ty });
        }

        Ok(Schema {
            attributes: attrs,
            index,
        })
    }

    /// Convenience constructor returning a [SchemaRef]
    pub fn shared<I, S>(attributes: I) -> OperonResult<SchemaRef>
    where
        I: IntoIterator<Item = (S, AttributeType)>,
        S: Into<String>,
    {
        Schema::new(attributes).map(Arc::new)
    }

    /// A schema without attributes
    pub fn empty() -> Schema {
        Schema {
            attributes: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    #[inline]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.attributes[i])
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tuple<")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", attr.ty, attr.name)?;
        }
        f.write_str(">")
    }
}

/// Cheap pointer comparison first, structural comparison otherwise
#[inline]
pub(crate) fn same_schema(a: &SchemaRef, b: &SchemaRef) -> bool {
    Arc::ptr_eq(a, b) || a == b
}
