//! Attribute values and references.
//!
//! A [`Value`] is either a literal or a [`Reference`] to an output of
//! another resource. References are a distinct variant so that the graph
//! can discover dependency edges statically, without evaluating anything.

use std::collections::BTreeMap;
use std::fmt;

use cirrus_common::types::ResourceId;
use serde::{Serialize, Serializer};

/// Lazy binding to the eventual output `output` of resource `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// Resource whose output is referenced.
    pub target: ResourceId,
    /// Name of the referenced output attribute.
    pub output: String,
}

impl Reference {
    /// Creates a reference to `output` of `target`.
    #[must_use]
    pub fn new(target: &ResourceId, output: impl Into<String>) -> Self {
        Self {
            target: target.clone(),
            output: output.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.target, self.output)
    }
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Literal(String),
    /// Text substituted from a referenced output.
    Ref(Reference),
}

/// Value of a resource attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Explicitly absent value.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// String literal.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested block with named fields.
    Map(BTreeMap<String, Value>),
    /// Reference to another resource's output.
    Ref(Reference),
    /// String interpolation mixing literal text and references.
    Template(Vec<Segment>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string literal, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the nested block fields, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Collects every reference in this value together with the dotted
    /// attribute path under which it appears.
    ///
    /// List positions are not part of the path: `subnet_ids` rather than
    /// `subnet_ids.0`.
    pub fn collect_references<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a Reference)>) {
        match self {
            Self::Ref(reference) => out.push((path.to_owned(), reference)),
            Self::Template(segments) => {
                for segment in segments {
                    if let Segment::Ref(reference) = segment {
                        out.push((path.to_owned(), reference));
                    }
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_references(path, out);
                }
            }
            Self::Map(map) => {
                for (key, value) in map {
                    value.collect_references(&format!("{path}.{key}"), out);
                }
            }
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::String(_) => {}
        }
    }

    /// Substitutes every reference through `lookup`, returning a pure
    /// literal, or `None` if any referenced output is not yet known.
    pub fn resolve<F>(&self, lookup: &F) -> Option<Self>
    where
        F: Fn(&Reference) -> Option<Self>,
    {
        match self {
            Self::Ref(reference) => lookup(reference),
            Self::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(s) => text.push_str(s),
                        Segment::Ref(reference) => text.push_str(&lookup(reference)?.scalar_text()?),
                    }
                }
                Some(Self::String(text))
            }
            Self::List(items) => items
                .iter()
                .map(|item| item.resolve(lookup))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| v.resolve(lookup).map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Self::Map),
            literal => Some(literal.clone()),
        }
    }

    fn scalar_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Escapes `${` so literal text never reads as an interpolation.
fn escape_literal(text: &str) -> String {
    text.replace("${", "$${")
}

struct TemplateText<'a>(&'a [Segment]);

impl fmt::Display for TemplateText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.0 {
            match segment {
                Segment::Literal(s) => f.write_str(&escape_literal(s))?,
                Segment::Ref(reference) => write!(f, "{reference}")?,
            }
        }
        Ok(())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::String(s) => serializer.serialize_str(&escape_literal(s)),
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(map) => serializer.collect_map(map),
            Self::Ref(reference) => serializer.collect_str(reference),
            Self::Template(segments) => serializer.collect_str(&TemplateText(segments)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Self::Ref(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).expect("valid id")
    }

    #[test]
    fn reference_displays_as_interpolation() {
        let r = Reference::new(&id("vpc"), "id");
        assert_eq!(r.to_string(), "${vpc.id}");
    }

    #[test]
    fn collect_references_records_nested_paths() {
        let mut vpc_config = BTreeMap::new();
        let _ = vpc_config.insert(
            "subnet_ids".to_owned(),
            Value::from(vec![
                Reference::new(&id("subnet1"), "id"),
                Reference::new(&id("subnet2"), "id"),
            ]),
        );
        let value = Value::Map(vpc_config);

        let mut refs = Vec::new();
        value.collect_references("vpc_config", &mut refs);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|(path, _)| path == "vpc_config.subnet_ids"));
        assert_eq!(refs[1].1.target, id("subnet2"));
    }

    #[test]
    fn template_references_are_collected() {
        let value = Value::Template(vec![
            Segment::Ref(Reference::new(&id("api-gw"), "execution_arn")),
            Segment::Literal("/*/*".into()),
        ]);
        let mut refs = Vec::new();
        value.collect_references("source_arn", &mut refs);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].1.output, "execution_arn");
    }

    #[test]
    fn serialize_renders_references_and_templates() {
        let value = Value::Template(vec![
            Segment::Ref(Reference::new(&id("api-gw"), "execution_arn")),
            Segment::Literal("/*/*".into()),
        ]);
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#""${api-gw.execution_arn}/*/*""#);
    }

    #[test]
    fn serialize_escapes_literal_interpolation() {
        let json = serde_json::to_string(&Value::from("cost ${x}")).expect("serialize");
        assert_eq!(json, r#""cost $${x}""#);
    }

    #[test]
    fn resolve_substitutes_known_outputs() {
        let db = id("db");
        let value = Value::Template(vec![
            Segment::Literal("port=".into()),
            Segment::Ref(Reference::new(&db, "port")),
        ]);
        let resolved = value.resolve(&|r: &Reference| {
            (r.output == "port").then_some(Value::Integer(5432))
        });
        assert_eq!(resolved, Some(Value::from("port=5432")));
    }

    #[test]
    fn resolve_is_none_when_any_reference_unknown() {
        let value = Value::from(vec![
            Value::from("literal"),
            Value::Ref(Reference::new(&id("vpc"), "id")),
        ]);
        assert_eq!(value.resolve(&|_: &Reference| None), None);
    }
}
