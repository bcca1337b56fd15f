use crate::Error;
use crate::schema::{Fields, Schema, Scope};

/// Constraint attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    /// Required unless the named sibling field is set.
    RequiredWithout(&'static str),
}

impl Rule {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::RequiredWithout(_) => "required_without",
        }
    }
}

/// Message templates keyed by rule tag. `{field}`, `{scope}` and `{other}`
/// are substituted.
pub type MessageTable = &'static [(&'static str, &'static str)];

const ENGLISH: MessageTable = &[
    ("required", "{field} value is not set in a {scope} config"),
    (
        "required_without",
        "{field} value is not set in a {scope} config and neither is {other}",
    ),
];

/// Runs field rules and renders operator-facing messages.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    messages: MessageTable,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new(ENGLISH)
    }
}

impl ValidationContext {
    pub fn new(messages: MessageTable) -> Self {
        Self { messages }
    }

    /// Check every rule in declaration order; the first violation wins.
    pub fn check(&self, schema: &Schema, fields: &Fields) -> Result<(), Error> {
        for spec in schema.fields {
            let Some(rule) = spec.rule else {
                continue;
            };
            let satisfied = match rule {
                Rule::Required => fields.is_set(spec.key),
                Rule::RequiredWithout(other) => fields.is_set(spec.key) || fields.is_set(other),
            };
            if !satisfied {
                return Err(self.violation(rule, spec.key, schema.scope));
            }
        }
        Ok(())
    }

    pub fn violation(&self, rule: Rule, field: &'static str, scope: Scope) -> Error {
        let template = self
            .messages
            .iter()
            .find(|(tag, _)| *tag == rule.tag())
            .map(|(_, template)| *template)
            .unwrap_or("{field} failed the {tag} check in a {scope} config");

        let other = match rule {
            Rule::RequiredWithout(other) => other,
            Rule::Required => "",
        };

        Error::Validation {
            field,
            scope,
            message: template
                .replace("{field}", field)
                .replace("{scope}", scope.as_str())
                .replace("{other}", other)
                .replace("{tag}", rule.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_messages() {
        let ctx = ValidationContext::default();

        let err = ctx.violation(Rule::Required, "hcloud_token", Scope::Plugin);
        assert_eq!(err.to_string(), "hcloud_token value is not set in a plugin config");

        let err = ctx.violation(
            Rule::RequiredWithout("hcloud_location"),
            "hcloud_datacenter",
            Scope::Target,
        );
        assert_eq!(
            err.to_string(),
            "hcloud_datacenter value is not set in a target config and neither is hcloud_location"
        );
    }

    #[test]
    fn custom_table_with_fallback() {
        const TERSE: MessageTable = &[("required", "missing {field}")];
        let ctx = ValidationContext::new(TERSE);

        assert_eq!(
            ctx.violation(Rule::Required, "a", Scope::Target).to_string(),
            "missing a"
        );
        assert_eq!(
            ctx.violation(Rule::RequiredWithout("b"), "a", Scope::Target)
                .to_string(),
            "a failed the required_without check in a target config"
        );
    }
}
