use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::resolver::{FieldKind, Resolver, Value};
use crate::validate::{Rule, ValidationContext};
use crate::{FlatConfig, Result};

/// Which config block a field belongs to. Shown in validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Plugin,
    Target,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one config key.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub default: Option<&'static str>,
    pub rule: Option<Rule>,
}

impl FieldSpec {
    pub const fn new(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            kind,
            default: None,
            rule: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn with_rule(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// All fields of one config scope.
#[derive(Debug)]
pub struct Schema {
    pub scope: Scope,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    /// Apply defaults, resolve every field, then validate.
    ///
    /// Blank input counts as unset.
    pub async fn resolve(
        &self,
        raw: &FlatConfig,
        resolver: &Resolver<'_>,
        validation: &ValidationContext,
    ) -> Result<Fields> {
        let mut values = HashMap::with_capacity(self.fields.len());

        for spec in self.fields {
            let supplied = raw
                .get(spec.key)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty());

            let value = match supplied.or(spec.default) {
                Some(input) => resolver.resolve(spec.key, &spec.kind, input).await?,
                None => spec.kind.zero(),
            };
            trace!(scope = %self.scope, key = spec.key, "resolved config field");
            values.insert(spec.key, value);
        }

        let fields = Fields {
            scope: self.scope,
            values,
        };
        validation.check(self, &fields)?;
        Ok(fields)
    }
}

/// Resolved values of one scope, keyed by config key.
#[derive(Debug)]
pub struct Fields {
    scope: Scope,
    values: HashMap<&'static str, Value>,
}

impl Fields {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(Value::is_set)
    }

    /// Move a value out; missing keys come back as [`Value::Unset`].
    pub fn take(&mut self, key: &str) -> Value {
        self.values.remove(key).unwrap_or(Value::Unset)
    }

    /// Move a value out and convert it, failing like a `required` rule when
    /// the conversion yields nothing.
    pub fn require<T>(
        &mut self,
        key: &'static str,
        convert: impl FnOnce(Value) -> Option<T>,
    ) -> Result<T> {
        convert(self.take(key))
            .ok_or_else(|| ValidationContext::default().violation(Rule::Required, key, self.scope))
    }
}
