//! Standard cell types and their NeuroML translation.
//!
//! Only the conductance-based integrate-and-fire cells have a NeuroML v1
//! rendering. Each one becomes a single compartment whose geometry is chosen
//! so that the membrane area is 1e5 um^2 (1e-3 cm^2): that turns PyNN's total
//! capacitance (nF) and time constant (ms) into the per-area units the
//! biophysics schema wants.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::document::{Namespace, Node};
use crate::{NeuroMLError, Result};

/// Parameter name -> value, in insertion order
pub type CellParameters = IndexMap<String, f64>;

/// Soma length (micron)
pub const SOMA_LENGTH: u32 = 100;

/// Soma diameter (micron); with [`SOMA_LENGTH`] gives an area of 1e5 um^2
pub const SOMA_DIAMETER: f64 = 1000.0 / PI;

/// Axial resistance placeholder, irrelevant for a single compartment
pub const AXIAL_RESISTANCE: &str = "0.1";

/// Conductance while refractory, only needs to be large enough
pub const REFRACTORY_CONDUCTANCE: f64 = 0.1;

/// Nominal peak synaptic conductance
pub const SYNAPSE_MAX_CONDUCTANCE: &str = "1.0e-5";

/// Rise time of the synaptic conductance, negligible
pub const SYNAPSE_RISE_TIME: &str = "1.0e-12";

pub const EXCITATORY_SYNAPSE: &str = "ExcitatorySynapse";
pub const INHIBITORY_SYNAPSE: &str = "InhibitorySynapse";

// ============================================================================
// STANDARD CELL MODELS
// ============================================================================

/// PyNN standard cell models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellModel {
    /// LIF, fixed threshold, decaying-exponential conductance
    #[serde(rename = "IF_cond_exp")]
    IfCondExp,
    /// LIF, fixed threshold, alpha-function conductance
    #[serde(rename = "IF_cond_alpha")]
    IfCondAlpha,
    /// LIF, fixed threshold, decaying-exponential current
    #[serde(rename = "IF_curr_exp")]
    IfCurrExp,
    /// LIF, fixed threshold, alpha-function current
    #[serde(rename = "IF_curr_alpha")]
    IfCurrAlpha,
    /// Poisson spike source
    SpikeSourcePoisson,
    /// Spikes at given times
    SpikeSourceArray,
}

const IF_COND_EXP_DEFAULTS: &[(&str, f64)] = &[
    ("v_rest", -65.0),
    ("cm", 1.0),
    ("tau_m", 20.0),
    ("tau_refrac", 0.0),
    ("tau_syn_E", 5.0),
    ("tau_syn_I", 5.0),
    ("e_rev_E", 0.0),
    ("e_rev_I", -70.0),
    ("v_thresh", -50.0),
    ("v_reset", -65.0),
    ("i_offset", 0.0),
    ("v_init", -65.0),
];

const IF_COND_ALPHA_DEFAULTS: &[(&str, f64)] = &[
    ("v_rest", -65.0),
    ("cm", 1.0),
    ("tau_m", 20.0),
    ("tau_refrac", 0.0),
    ("tau_syn_E", 0.3),
    ("tau_syn_I", 0.5),
    ("e_rev_E", 0.0),
    ("e_rev_I", -70.0),
    ("v_thresh", -50.0),
    ("v_reset", -65.0),
    ("i_offset", 0.0),
    ("v_init", -65.0),
];

impl CellModel {
    pub const ALL: [CellModel; 6] = [
        CellModel::IfCondExp,
        CellModel::IfCondAlpha,
        CellModel::IfCurrExp,
        CellModel::IfCurrAlpha,
        CellModel::SpikeSourcePoisson,
        CellModel::SpikeSourceArray,
    ];

    /// PyNN class name
    pub fn name(&self) -> &'static str {
        match self {
            CellModel::IfCondExp => "IF_cond_exp",
            CellModel::IfCondAlpha => "IF_cond_alpha",
            CellModel::IfCurrExp => "IF_curr_exp",
            CellModel::IfCurrAlpha => "IF_curr_alpha",
            CellModel::SpikeSourcePoisson => "SpikeSourcePoisson",
            CellModel::SpikeSourceArray => "SpikeSourceArray",
        }
    }

    /// Synapse shape, for the models that have a NeuroML translation
    pub fn synapse_kind(&self) -> Option<SynapseKind> {
        match self {
            CellModel::IfCondExp => Some(SynapseKind::DoubleExponential),
            CellModel::IfCondAlpha => Some(SynapseKind::Alpha),
            _ => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.synapse_kind().is_some()
    }

    /// Default parameters of the supported models
    pub fn default_parameters(&self) -> Option<&'static [(&'static str, f64)]> {
        match self {
            CellModel::IfCondExp => Some(IF_COND_EXP_DEFAULTS),
            CellModel::IfCondAlpha => Some(IF_COND_ALPHA_DEFAULTS),
            _ => None,
        }
    }
}

impl fmt::Display for CellModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellModel {
    type Err = NeuroMLError;

    fn from_str(s: &str) -> Result<Self> {
        CellModel::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| NeuroMLError::InvalidArgument(format!("unknown cell type {:?}", s)))
    }
}

/// Shape of the synaptic conductance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynapseKind {
    /// Double exponential with negligible rise time
    DoubleExponential,
    Alpha,
}

impl SynapseKind {
    /// ChannelML element name
    pub fn element(&self) -> &'static str {
        match self {
            SynapseKind::DoubleExponential => "doub_exp_syn",
            SynapseKind::Alpha => "alpha_syn",
        }
    }
}

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// Parameters read by the translation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct IfCondParameters {
    v_rest: f64,
    cm: f64,
    tau_m: f64,
    tau_refrac: f64,
    tau_syn_e: f64,
    tau_syn_i: f64,
    e_rev_e: f64,
    e_rev_i: f64,
    v_thresh: f64,
    v_reset: f64,
}

impl IfCondParameters {
    fn from_map(parameters: &CellParameters) -> Result<Self> {
        let get = |name: &str| {
            parameters.get(name).copied().ok_or_else(|| {
                NeuroMLError::InvalidArgument(format!("missing parameter {}", name))
            })
        };
        Ok(Self {
            v_rest: get("v_rest")?,
            cm: get("cm")?,
            tau_m: get("tau_m")?,
            tau_refrac: get("tau_refrac")?,
            tau_syn_e: get("tau_syn_E")?,
            tau_syn_i: get("tau_syn_I")?,
            e_rev_e: get("e_rev_E")?,
            e_rev_i: get("e_rev_I")?,
            v_thresh: get("v_thresh")?,
            v_reset: get("v_reset")?,
        })
    }
}

/// One cell model instantiation, shared by every cell of a population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTypeDescriptor {
    model: CellModel,
    label: String,
    parameters: CellParameters,
    synapse_kind: SynapseKind,
    values: IfCondParameters,
}

impl CellTypeDescriptor {
    /// Merge `overrides` into the model defaults.
    ///
    /// Models without a NeuroML translation fail here, before any node is
    /// built.
    pub fn new(model: CellModel, overrides: &CellParameters) -> Result<Self> {
        let (Some(synapse_kind), Some(defaults)) = (model.synapse_kind(), model.default_parameters())
        else {
            return Err(NeuroMLError::UnsupportedModel(model.name().to_string()));
        };

        let mut parameters: CellParameters = defaults
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect();
        for (name, &value) in overrides {
            let Some(slot) = parameters.get_mut(name) else {
                return Err(NeuroMLError::InvalidArgument(format!(
                    "{} has no parameter {:?}",
                    model, name
                )));
            };
            if !value.is_finite() {
                return Err(NeuroMLError::InvalidArgument(format!(
                    "{} parameter {} must be finite, got {}",
                    model, name, value
                )));
            }
            *slot = value;
        }

        let values = IfCondParameters::from_map(&parameters)?;
        if values.tau_m <= 0.0 {
            return Err(NeuroMLError::InvalidArgument(format!(
                "{} tau_m must be positive, got {}",
                model, values.tau_m
            )));
        }

        Ok(Self {
            model,
            label: model.name().to_string(),
            parameters,
            synapse_kind,
            values,
        })
    }

    pub fn model(&self) -> CellModel {
        self.model
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    /// Full parameter set, defaults included
    pub fn parameters(&self) -> &CellParameters {
        &self.parameters
    }

    pub fn synapse_kind(&self) -> SynapseKind {
        self.synapse_kind
    }

    /// Leak conductance per unit area.
    ///
    /// cm / tau_m is the total leak conductance; spread over the 1e-3 cm^2
    /// soma it becomes a density in S/cm^2.
    pub fn gmax(&self) -> f64 {
        1e-3 * self.values.cm / self.values.tau_m
    }

    /// `mml:segments` and `mml:cables` for the single soma compartment
    pub fn define_morphology(&self) -> (Node, Node) {
        let soma = Node::new(Namespace::Mml, "segment")
            .with_attr("id", 0)
            .with_attr("name", "Soma")
            .with_attr("cable", 0)
            .with_child(
                Node::new(Namespace::Mml, "proximal")
                    .with_attr("x", 0)
                    .with_attr("y", 0)
                    .with_attr("z", 0)
                    .with_attr("diameter", SOMA_DIAMETER),
            )
            .with_child(
                Node::new(Namespace::Mml, "distal")
                    .with_attr("x", 0)
                    .with_attr("y", 0)
                    .with_attr("z", SOMA_LENGTH)
                    .with_attr("diameter", SOMA_DIAMETER),
            );
        let segments = Node::new(Namespace::Mml, "segments").with_child(soma);

        let cable = Node::new(Namespace::Mml, "cable")
            .with_attr("id", 0)
            .with_attr("name", "Soma")
            .with_child(Node::new(Namespace::Meta, "group").with_text("all"));
        let cables = Node::new(Namespace::Mml, "cables").with_child(cable);

        (segments, cables)
    }

    /// `biophysics` node. Child order is fixed: IandF, pas, excitatory,
    /// inhibitory, specific capacitance, specific axial resistance.
    pub fn define_biophysics(&self) -> Node {
        let mechanism = |name: &str| {
            Node::new(Namespace::Bio, "mechanism")
                .with_attr("name", name)
                .with_attr("type", "Channel Mechanism")
        };

        let passive = mechanism("pas").with_child(parameter_node(Some("gmax"), self.gmax()));
        let capacitance = Node::new(Namespace::Bio, "specificCapacitance")
            .with_child(parameter_node(None, self.values.cm));
        let axial_resistance = Node::new(Namespace::Bio, "specificAxialResistance")
            .with_child(parameter_node(None, AXIAL_RESISTANCE));

        Node::unqualified("biophysics")
            .with_attr("units", "Physiological Units")
            .with_child(mechanism("IandF"))
            .with_child(passive)
            .with_child(mechanism(EXCITATORY_SYNAPSE))
            .with_child(mechanism(INHIBITORY_SYNAPSE))
            .with_child(capacitance)
            .with_child(axial_resistance)
    }

    /// Ion, leak channel and spike/reset mechanism
    pub fn define_channel_types(&self) -> Vec<Node> {
        let ion = Node::new(Namespace::Cml, "ion")
            .with_attr("name", "non_specific")
            .with_attr("charge", 1)
            .with_attr("default_erev", self.values.v_rest);

        let passive = Node::new(Namespace::Cml, "channel_type")
            .with_attr("name", "pas")
            .with_attr("density", "yes")
            .with_child(
                Node::new(Namespace::Meta, "notes")
                    .with_text("Simple example of a leak/passive conductance"),
            )
            .with_child(
                Node::new(Namespace::Cml, "current_voltage_relation").with_child(
                    Node::new(Namespace::Cml, "ohmic")
                        .with_attr("ion", "non_specific")
                        .with_child(
                            Node::new(Namespace::Cml, "conductance")
                                .with_attr("default_gmax", self.gmax()),
                        ),
                ),
            );

        let spike_reset = Node::new(Namespace::Cml, "channel_type")
            .with_attr("name", "IandF")
            .with_child(Node::new(Namespace::Meta, "notes").with_text("Spike and reset mechanism"))
            .with_child(
                Node::new(Namespace::Cml, "current_voltage_relation").with_child(
                    Node::new(Namespace::Cml, "integrate_and_fire")
                        .with_attr("threshold", self.values.v_thresh)
                        .with_attr("t_refrac", self.values.tau_refrac)
                        .with_attr("v_reset", self.values.v_reset)
                        .with_attr("g_refrac", REFRACTORY_CONDUCTANCE),
                ),
            );

        vec![ion, passive, spike_reset]
    }

    /// Excitatory and inhibitory synapse types, shaped by the synapse kind
    pub fn define_synapse_types(&self) -> Vec<Node> {
        let synapse = |name: &str, decay_time: f64, reversal_potential: f64| {
            Node::new(Namespace::Cml, "synapse_type")
                .with_attr("name", name)
                .with_child(
                    Node::new(Namespace::Cml, self.synapse_kind.element())
                        .with_attr("max_conductance", SYNAPSE_MAX_CONDUCTANCE)
                        .with_attr("rise_time", SYNAPSE_RISE_TIME)
                        .with_attr("decay_time", decay_time)
                        .with_attr("reversal_potential", reversal_potential),
                )
        };
        vec![
            synapse(EXCITATORY_SYNAPSE, self.values.tau_syn_e, self.values.e_rev_e),
            synapse(INHIBITORY_SYNAPSE, self.values.tau_syn_i, self.values.e_rev_i),
        ]
    }

    /// The `cell` node and the channel/synapse type nodes
    pub fn build_nodes(&self) -> (Node, Vec<Node>) {
        let (segments, cables) = self.define_morphology();
        let cell = Node::unqualified("cell")
            .with_attr("name", self.label.as_str())
            .with_child(
                Node::new(Namespace::Meta, "notes")
                    .with_text(&format!("Instance of PyNN {} cell type", self.model)),
            )
            .with_child(segments)
            .with_child(cables)
            .with_child(self.define_biophysics());

        let mut channels = self.define_channel_types();
        channels.extend(self.define_synapse_types());
        (cell, channels)
    }
}

/// `bio:parameter` applying to the whole cell
fn parameter_node(name: Option<&str>, value: impl crate::document::AttrValue) -> Node {
    let mut node = Node::new(Namespace::Bio, "parameter").with_attr("value", value);
    if let Some(name) = name {
        node.set_attr("name", name);
    }
    node.with_child(Node::new(Namespace::Bio, "group").with_text("all"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> CellParameters {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn attr_f64(node: &Node, name: &str) -> f64 {
        node.attribute(name).unwrap().parse().unwrap()
    }

    #[test]
    fn test_gmax_in_biophysics_and_channels() {
        let cell =
            CellTypeDescriptor::new(CellModel::IfCondExp, &params(&[("cm", 1.0), ("tau_m", 20.0)]))
                .unwrap();
        let expected = 1e-3 * 1.0 / 20.0;
        assert_eq!(cell.gmax(), expected);

        let biophysics = cell.define_biophysics();
        let passive = &biophysics.children()[1];
        assert_eq!(passive.attribute("name"), Some("pas"));
        let gmax = passive.child("bio:parameter").unwrap();
        assert_eq!(gmax.attribute("name"), Some("gmax"));
        assert_eq!(gmax.attribute("value"), Some("5e-05"));
        assert_eq!(attr_f64(gmax, "value"), expected);

        let channels = cell.define_channel_types();
        let conductance = channels[1]
            .find("cml:current_voltage_relation/cml:ohmic/cml:conductance")
            .unwrap();
        assert_eq!(attr_f64(conductance, "default_gmax"), expected);
    }

    #[test]
    fn test_biophysics_order() {
        let cell = CellTypeDescriptor::new(CellModel::IfCondAlpha, &CellParameters::new()).unwrap();
        let biophysics = cell.define_biophysics();
        assert_eq!(biophysics.qualified_name(), "biophysics");
        assert_eq!(biophysics.attribute("units"), Some("Physiological Units"));

        let order: Vec<String> = biophysics
            .children()
            .iter()
            .map(|c| match c.attribute("name") {
                Some(name) => name.to_string(),
                None => c.qualified_name(),
            })
            .collect();
        assert_eq!(
            order,
            vec![
                "IandF",
                "pas",
                "ExcitatorySynapse",
                "InhibitorySynapse",
                "bio:specificCapacitance",
                "bio:specificAxialResistance"
            ]
        );

        let cm = biophysics.find("bio:specificCapacitance/bio:parameter").unwrap();
        assert_eq!(cm.attribute("value"), Some("1.0"));
        assert!(cm.attribute("name").is_none());
        assert_eq!(cm.child("bio:group").unwrap().text(), Some("all"));

        let ra = biophysics
            .find("bio:specificAxialResistance/bio:parameter")
            .unwrap();
        assert_eq!(ra.attribute("value"), Some("0.1"));
    }

    #[test]
    fn test_morphology_area() {
        let cell = CellTypeDescriptor::new(CellModel::IfCondExp, &CellParameters::new()).unwrap();
        let (segments, cables) = cell.define_morphology();
        let soma = segments.child("mml:segment").unwrap();
        assert_eq!(soma.attribute("name"), Some("Soma"));

        let proximal = soma.child("mml:proximal").unwrap();
        let distal = soma.child("mml:distal").unwrap();
        let diameter = attr_f64(proximal, "diameter");
        let length = attr_f64(distal, "z") - attr_f64(proximal, "z");
        assert_eq!(length, 100.0);
        // lateral area in um^2, i.e. 1e-3 cm^2
        assert!((PI * diameter * length - 1e5).abs() < 1e-6);

        let group = cables.find("mml:cable/meta:group").unwrap();
        assert_eq!(group.text(), Some("all"));
    }

    #[test]
    fn test_channel_types() {
        let cell = CellTypeDescriptor::new(
            CellModel::IfCondExp,
            &params(&[("v_rest", -70.0), ("v_thresh", -52.0), ("tau_refrac", 2.0)]),
        )
        .unwrap();
        let channels = cell.define_channel_types();
        assert_eq!(channels.len(), 3);

        let ion = &channels[0];
        assert_eq!(ion.qualified_name(), "cml:ion");
        assert_eq!(ion.attribute("charge"), Some("1"));
        assert_eq!(ion.attribute("default_erev"), Some("-70.0"));

        let iaf = channels[2]
            .find("cml:current_voltage_relation/cml:integrate_and_fire")
            .unwrap();
        assert_eq!(iaf.attribute("threshold"), Some("-52.0"));
        assert_eq!(iaf.attribute("t_refrac"), Some("2.0"));
        assert_eq!(iaf.attribute("v_reset"), Some("-65.0"));
        assert_eq!(iaf.attribute("g_refrac"), Some("0.1"));
    }

    #[test]
    fn test_synapse_shape_follows_model() {
        let exp = CellTypeDescriptor::new(CellModel::IfCondExp, &CellParameters::new()).unwrap();
        let synapses = exp.define_synapse_types();
        assert_eq!(synapses[0].attribute("name"), Some(EXCITATORY_SYNAPSE));
        let kinetics = synapses[0].child("cml:doub_exp_syn").unwrap();
        assert_eq!(kinetics.attribute("max_conductance"), Some("1.0e-5"));
        assert_eq!(kinetics.attribute("rise_time"), Some("1.0e-12"));
        assert_eq!(kinetics.attribute("decay_time"), Some("5.0"));
        assert_eq!(kinetics.attribute("reversal_potential"), Some("0.0"));

        let alpha = CellTypeDescriptor::new(CellModel::IfCondAlpha, &CellParameters::new()).unwrap();
        let synapses = alpha.define_synapse_types();
        let kinetics = synapses[1].child("cml:alpha_syn").unwrap();
        assert_eq!(synapses[1].attribute("name"), Some(INHIBITORY_SYNAPSE));
        assert_eq!(kinetics.attribute("decay_time"), Some("0.5"));
        assert_eq!(kinetics.attribute("reversal_potential"), Some("-70.0"));
    }

    #[test]
    fn test_unsupported_models() {
        for model in [
            CellModel::IfCurrExp,
            CellModel::IfCurrAlpha,
            CellModel::SpikeSourcePoisson,
            CellModel::SpikeSourceArray,
        ] {
            assert!(!model.is_supported());
            match CellTypeDescriptor::new(model, &CellParameters::new()) {
                Err(NeuroMLError::UnsupportedModel(name)) => assert_eq!(name, model.name()),
                other => panic!("expected UnsupportedModel, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_parameter_validation() {
        assert!(matches!(
            CellTypeDescriptor::new(CellModel::IfCondExp, &params(&[("tau_w", 1.0)])),
            Err(NeuroMLError::InvalidArgument(_))
        ));
        assert!(matches!(
            CellTypeDescriptor::new(CellModel::IfCondExp, &params(&[("tau_m", 0.0)])),
            Err(NeuroMLError::InvalidArgument(_))
        ));
        assert!(matches!(
            CellTypeDescriptor::new(CellModel::IfCondExp, &params(&[("cm", f64::NAN)])),
            Err(NeuroMLError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_nodes() {
        let mut cell = CellTypeDescriptor::new(CellModel::IfCondExp, &CellParameters::new()).unwrap();
        assert_eq!(cell.label(), "IF_cond_exp");
        cell.set_label("IF_cond_exp_Population0");

        let (node, channels) = cell.build_nodes();
        assert_eq!(node.attribute("name"), Some("IF_cond_exp_Population0"));
        let kids: Vec<String> = node.children().iter().map(Node::qualified_name).collect();
        assert_eq!(kids, vec!["meta:notes", "mml:segments", "mml:cables", "biophysics"]);
        assert_eq!(
            node.child("meta:notes").unwrap().text(),
            Some("Instance of PyNN IF_cond_exp cell type")
        );
        assert_eq!(channels.len(), 5);
        assert_eq!(cell.parameters().len(), 12);
    }

    #[test]
    fn test_model_names() {
        for model in CellModel::ALL {
            assert_eq!(model.name().parse::<CellModel>().unwrap(), model);
        }
        assert!("IF_facets_hardware1".parse::<CellModel>().is_err());
        let json = serde_json::to_string(&CellModel::IfCondAlpha).unwrap();
        assert_eq!(json, "\"IF_cond_alpha\"");
    }
}
