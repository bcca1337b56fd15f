use std::sync::Arc;

use crate::cluster::{ClusterNode, NodeIdLookup};
use crate::{Error, Result};

/// Identifies the server behind a cluster node through one node attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    attribute: String,
}

impl NodeIdentity {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Absent and empty attributes are both missing.
    pub fn identify(&self, node: &ClusterNode) -> Result<String> {
        match node.attributes.get(&self.attribute) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(Error::AttributeMissing(self.attribute.clone())),
        }
    }

    pub fn into_lookup(self) -> NodeIdLookup {
        Arc::new(move |node| self.identify(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(attributes: &[(&str, &str)]) -> ClusterNode {
        ClusterNode {
            id: "node-1".into(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn identify() {
        let identity = NodeIdentity::new("unique.hostname");

        let cases = [
            (node(&[("unique.hostname", "test-1")]), Some("test-1")),
            (node(&[]), None),
            (node(&[("unique.hostname", "")]), None),
            (node(&[("unique.platform.aws.hostname", "test-1")]), None),
        ];

        for (input, expected) in cases {
            match (identity.identify(&input), expected) {
                (Ok(id), Some(expected)) => assert_eq!(id, expected),
                (Err(err), None) => {
                    assert!(matches!(&err, Error::AttributeMissing(attr) if attr == "unique.hostname"));
                    assert_eq!(err.to_string(), r#"attribute "unique.hostname" not found"#);
                }
                (other, expected) => panic!("unexpected {other:?} for {expected:?}"),
            }
        }
    }

    #[test]
    fn lookup_uses_configured_attribute() {
        let lookup = NodeIdentity::new("hcloud.server").into_lookup();
        assert_eq!(lookup(&node(&[("hcloud.server", "web-abc")])).unwrap(), "web-abc");
        assert!(lookup(&node(&[("unique.hostname", "web-abc")])).is_err());
    }
}
