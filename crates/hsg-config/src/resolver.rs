use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use hsg_cloud::CloudApi;
use hsg_cloud::types::{ResourceKind, ResourceRef};
use tracing::debug;

use crate::labels::parse_labels;
use crate::{Error, Result};

/// The closed set of shapes a configuration field can take.
///
/// Nested kinds are `'static` so that every schema can live in a static
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw string, kept verbatim.
    Text,
    /// Boolean, in any spelling Go's `strconv.ParseBool` accepts.
    Flag,
    /// Unsigned integer.
    Count,
    /// Duration such as `60s` or `1m 30s`.
    Duration,
    /// Remote resource looked up by ID or name.
    Resource(ResourceKind),
    /// Absent input stays unset instead of failing validation on shape.
    Optional(&'static FieldKind),
    /// Comma-separated list; empty segments are skipped.
    Sequence(&'static FieldKind),
    /// `key=value` pairs.
    Mapping,
    /// Struct without an identity of its own. Every sub-field is resolved
    /// from the same raw value.
    Composite(&'static [FieldKind]),
    /// Sub-field the resolver never populates.
    Opaque,
}

impl FieldKind {
    /// Value of a field nobody supplied and that has no default.
    pub fn zero(&self) -> Value {
        match self {
            Self::Optional(_) => Value::Optional(None),
            Self::Sequence(_) => Value::Sequence(Vec::new()),
            Self::Mapping => Value::Mapping(BTreeMap::new()),
            _ => Value::Unset,
        }
    }
}

/// A resolved configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unset,
    Text(String),
    Flag(bool),
    Count(u64),
    Duration(Duration),
    Resource(ResourceRef),
    Optional(Option<Box<Value>>),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, String>),
    Composite(Vec<Value>),
}

impl Value {
    /// Whether the value counts as present for `required` checks.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Unset => false,
            Self::Optional(inner) => inner.as_deref().is_some_and(Value::is_set),
            Self::Sequence(items) => !items.is_empty(),
            Self::Text(text) => !text.is_empty(),
            _ => true,
        }
    }

    fn unwrap_optional(self) -> Value {
        match self {
            Self::Optional(Some(inner)) => inner.unwrap_optional(),
            Self::Optional(None) => Self::Unset,
            other => other,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self.unwrap_optional() {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_flag(self) -> Option<bool> {
        match self.unwrap_optional() {
            Self::Flag(flag) => Some(flag),
            _ => None,
        }
    }

    pub fn into_count(self) -> Option<u64> {
        match self.unwrap_optional() {
            Self::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn into_duration(self) -> Option<Duration> {
        match self.unwrap_optional() {
            Self::Duration(duration) => Some(duration),
            _ => None,
        }
    }

    pub fn into_resource(self) -> Option<ResourceRef> {
        match self.unwrap_optional() {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn into_sequence(self) -> Vec<Value> {
        match self.unwrap_optional() {
            Self::Sequence(items) => items,
            _ => Vec::new(),
        }
    }

    pub fn into_mapping(self) -> BTreeMap<String, String> {
        match self.unwrap_optional() {
            Self::Mapping(map) => map,
            _ => BTreeMap::new(),
        }
    }

    pub fn into_composite(self) -> Vec<Value> {
        match self.unwrap_optional() {
            Self::Composite(fields) => fields,
            _ => Vec::new(),
        }
    }
}

/// Go's `strconv.ParseBool` spellings.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Turns raw strings into [`Value`]s by walking a [`FieldKind`].
///
/// Resource lookups go through the provider; an offline resolver rejects
/// them.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    cloud: Option<&'a dyn CloudApi>,
}

impl<'a> Resolver<'a> {
    pub fn new(cloud: &'a dyn CloudApi) -> Self {
        Self { cloud: Some(cloud) }
    }

    /// A resolver for schemas without resource fields.
    pub fn offline() -> Self {
        Self { cloud: None }
    }

    /// Resolve `raw` as a value of shape `kind` for config key `key`.
    pub fn resolve<'b>(
        &'b self,
        key: &'b str,
        kind: &'b FieldKind,
        raw: &'b str,
    ) -> BoxFuture<'b, Result<Value>>
    where
        'a: 'b,
    {
        async move {
            match *kind {
                FieldKind::Text => Ok(Value::Text(raw.to_string())),
                FieldKind::Flag => parse_flag(raw)
                    .map(Value::Flag)
                    .ok_or_else(|| Error::parse(key, raw, "invalid boolean")),
                FieldKind::Count => raw
                    .trim()
                    .parse::<u64>()
                    .map(Value::Count)
                    .map_err(|e| Error::parse(key, raw, e)),
                FieldKind::Duration => humantime::parse_duration(raw.trim())
                    .map(Value::Duration)
                    .map_err(|e| Error::parse(key, raw, e)),
                FieldKind::Resource(resource) => {
                    self.lookup(resource, raw.trim()).await.map(Value::Resource)
                }
                FieldKind::Optional(inner) => {
                    let value = self.resolve(key, inner, raw).await?;
                    Ok(Value::Optional(Some(Box::new(value))))
                }
                FieldKind::Sequence(inner) => {
                    let mut items = Vec::new();
                    for segment in raw.split(',').map(str::trim) {
                        if segment.is_empty() {
                            continue;
                        }
                        items.push(self.resolve(key, inner, segment).await?);
                    }
                    Ok(Value::Sequence(items))
                }
                FieldKind::Mapping => parse_labels(raw).map(Value::Mapping),
                FieldKind::Composite(fields) => {
                    let mut values = Vec::with_capacity(fields.len());
                    for field in fields {
                        values.push(self.resolve(key, field, raw).await?);
                    }
                    Ok(Value::Composite(values))
                }
                FieldKind::Opaque => Ok(Value::Unset),
            }
        }
        .boxed()
    }

    async fn lookup(&self, kind: ResourceKind, name: &str) -> Result<ResourceRef> {
        let failed = |reason: String| Error::ResourceResolution {
            kind,
            name: name.to_string(),
            reason,
        };

        let Some(cloud) = self.cloud else {
            return Err(failed("no provider client available".into()));
        };

        match cloud.lookup(kind, name).await {
            Ok(Some(resource)) => {
                debug!(%kind, name, id = resource.id, "resolved resource");
                Ok(resource)
            }
            Ok(None) => Err(failed("not found".into())),
            Err(e) => Err(failed(e.to_string())),
        }
    }
}
