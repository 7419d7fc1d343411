//! Projections between two populations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::celltype::{EXCITATORY_SYNAPSE, INHIBITORY_SYNAPSE};
use crate::connectors::{generate_connectivity, ConnectionMethod};
use crate::document::{Namespace, Node};
use crate::population::Population;
use crate::{NeuroMLError, Result};

/// Synapse-property defaults written on every projection
pub const DEFAULT_INTERNAL_DELAY: i32 = 5;
pub const DEFAULT_WEIGHT: i32 = 1;
pub const DEFAULT_THRESHOLD: i32 = -20;

/// Synapse a projection connects to on the postsynaptic cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SynapseTarget {
    #[default]
    #[serde(rename = "ExcitatorySynapse", alias = "excitatory")]
    Excitatory,
    #[serde(rename = "InhibitorySynapse", alias = "inhibitory")]
    Inhibitory,
}

impl SynapseTarget {
    /// Synapse type name shared with the cell's biophysics
    pub fn as_str(&self) -> &'static str {
        match self {
            SynapseTarget::Excitatory => EXCITATORY_SYNAPSE,
            SynapseTarget::Inhibitory => INHIBITORY_SYNAPSE,
        }
    }
}

impl fmt::Display for SynapseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynapseTarget {
    type Err = NeuroMLError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "excitatory" | EXCITATORY_SYNAPSE => Ok(SynapseTarget::Excitatory),
            "inhibitory" | INHIBITORY_SYNAPSE => Ok(SynapseTarget::Inhibitory),
            other => Err(NeuroMLError::InvalidArgument(format!(
                "unknown synapse target {:?}",
                other
            ))),
        }
    }
}

/// A labeled set of connections from one population to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    label: String,
    pre: String,
    post: String,
    target: SynapseTarget,
    method: &'static str,
}

impl Projection {
    /// Describe the projection and build its `net:projection` node.
    ///
    /// Fails without side effects when the connection method cannot be
    /// expressed for these populations.
    pub(crate) fn new(
        pre: &Population,
        post: &Population,
        method: &ConnectionMethod,
        target: SynapseTarget,
        label: &str,
    ) -> Result<(Self, Node)> {
        let connectivity = generate_connectivity(pre, post, method)?;

        let synapse_props = Node::new(Namespace::Net, "synapse_props")
            .with_child(Node::new(Namespace::Net, "synapse_type").with_text(target.as_str()))
            .with_child(
                Node::new(Namespace::Net, "default_values")
                    .with_attr("internal_delay", DEFAULT_INTERNAL_DELAY)
                    .with_attr("weight", DEFAULT_WEIGHT)
                    .with_attr("threshold", DEFAULT_THRESHOLD),
            );

        let node = Node::new(Namespace::Net, "projection")
            .with_attr("name", label)
            .with_child(Node::new(Namespace::Net, "source").with_text(pre.label()))
            .with_child(Node::new(Namespace::Net, "target").with_text(post.label()))
            .with_child(synapse_props)
            .with_child(connectivity);

        let projection = Self {
            label: label.to_string(),
            pre: pre.label().to_string(),
            post: post.label().to_string(),
            target,
            method: method.name(),
        };
        Ok((projection, node))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label of the presynaptic population
    pub fn pre(&self) -> &str {
        &self.pre
    }

    /// Label of the postsynaptic population
    pub fn post(&self) -> &str {
        &self.post
    }

    pub fn target(&self) -> SynapseTarget {
        self.target
    }

    /// PyNN name of the connection method
    pub fn method(&self) -> &str {
        self.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celltype::{CellModel, CellParameters};

    fn population(dims: &[usize], label: &str) -> Population {
        Population::new(dims, CellModel::IfCondExp, &CellParameters::new(), label, 0).unwrap()
    }

    #[test]
    fn test_synapse_target_names() {
        assert_eq!("excitatory".parse::<SynapseTarget>().unwrap(), SynapseTarget::Excitatory);
        assert_eq!(
            "InhibitorySynapse".parse::<SynapseTarget>().unwrap(),
            SynapseTarget::Inhibitory
        );
        assert!("modulatory".parse::<SynapseTarget>().is_err());
        assert_eq!(SynapseTarget::default().as_str(), "ExcitatorySynapse");

        let target: SynapseTarget = serde_json::from_str("\"inhibitory\"").unwrap();
        assert_eq!(target, SynapseTarget::Inhibitory);
    }

    #[test]
    fn test_projection_node() {
        let exc = population(&[3], "exc");
        let inh = population(&[2], "inh");
        let (projection, node) = Projection::new(
            &exc,
            &inh,
            &ConnectionMethod::all_to_all(),
            SynapseTarget::Inhibitory,
            "Projection0",
        )
        .unwrap();

        assert_eq!(projection.label(), "Projection0");
        assert_eq!(projection.pre(), "exc");
        assert_eq!(projection.post(), "inh");
        assert_eq!(projection.method(), "allToAll");

        assert_eq!(node.attribute("name"), Some("Projection0"));
        let kids: Vec<String> = node.children().iter().map(Node::qualified_name).collect();
        assert_eq!(
            kids,
            vec!["net:source", "net:target", "net:synapse_props", "net:connectivity_pattern"]
        );
        assert_eq!(node.child("net:source").unwrap().text(), Some("exc"));
        assert_eq!(node.child("net:target").unwrap().text(), Some("inh"));
        assert_eq!(
            node.find("net:synapse_props/net:synapse_type").unwrap().text(),
            Some("InhibitorySynapse")
        );

        let defaults = node.find("net:synapse_props/net:default_values").unwrap();
        assert_eq!(defaults.attribute("internal_delay"), Some("5"));
        assert_eq!(defaults.attribute("weight"), Some("1"));
        assert_eq!(defaults.attribute("threshold"), Some("-20"));
    }

    #[test]
    fn test_failed_connectivity() {
        let a = population(&[3], "a");
        let b = population(&[4], "b");
        let result = Projection::new(
            &a,
            &b,
            &ConnectionMethod::one_to_one(),
            SynapseTarget::Excitatory,
            "Projection0",
        );
        assert!(matches!(result, Err(NeuroMLError::InvalidArgument(_))));
    }
}
