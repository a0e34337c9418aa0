//! Configuration values and deferred tokens
//!
//! Resource configuration is a small JSON-like tree that may contain tokens whose
//! real value only exists once something has been provisioned: an attribute of a
//! resource in the same stack, an export of another stack, or a concatenation of
//! either. Tokens are resolved to plain JSON by the backend at apply time.

use crate::core::reference::CrossStackReference;
use crate::core::validation::LogicalName;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute a provisioned resource exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// Physical name (bucket name, role name, ...)
    Name,
    /// Amazon resource name
    Arn,
    /// Public or regional domain name
    DomainName,
    /// Provider-assigned id
    Id,
    /// Canonical user id of an origin-access identity
    CanonicalUserId,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::Name => "Name",
            Attribute::Arn => "Arn",
            Attribute::DomainName => "DomainName",
            Attribute::Id => "Id",
            Attribute::CanonicalUserId => "CanonicalUserId",
        };
        f.write_str(name)
    }
}

/// Reference to an attribute of a resource in the same stack
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub resource: LogicalName,
    pub attribute: Attribute,
}

/// Configuration value, possibly containing deferred tokens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Attribute of a resource declared in the same stack
    Attr(AttributeRef),
    /// Export of another stack
    Import(CrossStackReference),
    /// String concatenation of the resolved parts
    Join(Vec<Value>),
}

/// Supplies the real values behind tokens
pub trait TokenResolver {
    /// Look up an attribute of an already provisioned resource
    fn attribute(&self, attr: &AttributeRef) -> Option<String>;

    /// Look up the published value of another stack's export
    fn import(&self, reference: &CrossStackReference) -> Result<String>;
}

impl Value {
    /// Build a map value from key/value pairs
    pub fn map<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list value
    pub fn list<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Concatenate parts into one string at resolve time
    pub fn join<V: Into<Value>, I: IntoIterator<Item = V>>(parts: I) -> Value {
        Value::Join(parts.into_iter().map(Into::into).collect())
    }

    /// Plain string content, if this is a string literal
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True if the value contains no tokens
    pub fn is_literal(&self) -> bool {
        match self {
            Value::Attr(_) | Value::Import(_) => false,
            Value::List(items) | Value::Join(items) => items.iter().all(Value::is_literal),
            Value::Map(entries) => entries.values().all(Value::is_literal),
            _ => true,
        }
    }

    /// All attribute references in this value
    pub fn attribute_refs(&self) -> Vec<&AttributeRef> {
        let mut out = Vec::new();
        self.walk(&mut |v| {
            if let Value::Attr(attr) = v {
                out.push(attr);
            }
        });
        out
    }

    /// All cross-stack references in this value
    pub fn imports(&self) -> Vec<&CrossStackReference> {
        let mut out = Vec::new();
        self.walk(&mut |v| {
            if let Value::Import(reference) = v {
                out.push(reference);
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Value)) {
        visit(self);
        match self {
            Value::List(items) | Value::Join(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Value::Map(entries) => {
                for item in entries.values() {
                    item.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Replace every import with the string produced by `lookup`
    pub fn substitute_imports(
        &self,
        lookup: &impl Fn(&CrossStackReference) -> Result<String>,
    ) -> Result<Value> {
        Ok(match self {
            Value::Import(reference) => Value::Str(lookup(reference)?),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| v.substitute_imports(lookup))
                    .collect::<Result<_>>()?,
            ),
            Value::Join(items) => Value::Join(
                items
                    .iter()
                    .map(|v| v.substitute_imports(lookup))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.substitute_imports(lookup)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Resolve every token and produce plain JSON
    pub fn resolve(&self, resolver: &dyn TokenResolver) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve(resolver))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.resolve(resolver)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Attr(attr) => serde_json::Value::String(resolver.attribute(attr).ok_or_else(
                || StackError::UnresolvedAttribute {
                    logical_name: attr.resource.to_string(),
                    attribute: attr.attribute.to_string(),
                },
            )?),
            Value::Import(reference) => serde_json::Value::String(resolver.import(reference)?),
            Value::Join(parts) => {
                let mut joined = String::new();
                for part in parts {
                    match part.resolve(resolver)? {
                        serde_json::Value::String(s) => joined.push_str(&s),
                        other => joined.push_str(&other.to_string()),
                    }
                }
                serde_json::Value::String(joined)
            }
        })
    }

    /// Resolve to a string; non-string JSON is rendered compactly
    pub fn resolve_string(&self, resolver: &dyn TokenResolver) -> Result<String> {
        Ok(match self.resolve(resolver)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<AttributeRef> for Value {
    fn from(attr: AttributeRef) -> Self {
        Value::Attr(attr)
    }
}

impl From<CrossStackReference> for Value {
    fn from(reference: CrossStackReference) -> Self {
        Value::Import(reference)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}
