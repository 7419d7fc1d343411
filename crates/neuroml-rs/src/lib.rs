//! # NeuroML-RS: PyNN -> NeuroML Exporter Revival
//!
//! Revival of the `pyNN.neuroml` backend (PyNN 0.4, 2007-2008).
//! PyNN was created by Andrew Davison and the NeuralEnsemble community as a
//! simulator-independent language for building spiking networks.
//!
//! Instead of simulating, the NeuroML backend writes the network out as a
//! NeuroML v1.5 Level 3 document (MorphML + ChannelML + NetworkML):
//! - Standard integrate-and-fire cells become single-compartment cells with
//!   leak, spike/reset and synaptic mechanisms
//! - Populations become `net:population` elements with one instance per cell
//! - Projections become `net:projection` elements carrying either a
//!   connectivity pattern or an explicit connection list
//!
//! ## Usage
//!
//! ```no_run
//! use oldies_neuroml::{setup, CellModel, CellParameters, ConnectionMethod, SetupConfig};
//!
//! # fn main() -> oldies_neuroml::Result<()> {
//! let mut session = setup(SetupConfig::new("network.xml"))?;
//! let exc = session.create_population(&[10, 10], CellModel::IfCondExp, &CellParameters::new(), None)?;
//! let inh = session.create_population(&[25], CellModel::IfCondAlpha, &CellParameters::new(), Some("inh"))?;
//! session.create_projection(&exc, &inh, ConnectionMethod::fixed_probability(0.1), None, None)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

use oldies_core::OldiesError;
use thiserror::Error;

pub mod celltype;
pub mod connectors;
pub mod description;
pub mod document;
pub mod population;
pub mod projection;
pub mod session;

pub use celltype::{CellModel, CellParameters, CellTypeDescriptor, SynapseKind};
pub use connectors::{
    generate_connectivity, parse_connection_file, ConnectionCount, ConnectionMethod,
    ConnectionRecord, Direction, FixedNumber,
};
pub use description::{ExportSummary, NetworkDescription, PopulationSpec, ProjectionSpec};
pub use document::{build_node, Document, Namespace, Node};
pub use oldies_core::random::{RandomDistribution, SeededRng};
pub use population::Population;
pub use projection::{Projection, SynapseTarget};
pub use session::{setup, Session, SetupConfig};

#[derive(Error, Debug)]
pub enum NeuroMLError {
    #[error("Cell type {0} is not available in NeuroML")]
    UnsupportedModel(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
    #[error("Session is closed")]
    SessionClosed,
    #[error("IO error: {0}")]
    Resource(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NeuroMLError>;

impl From<OldiesError> for NeuroMLError {
    fn from(e: OldiesError) -> Self {
        match e {
            OldiesError::InvalidAddress(msg) | OldiesError::InvalidArgument(msg) => {
                NeuroMLError::InvalidArgument(msg)
            }
            OldiesError::ParseError(reason) => NeuroMLError::MalformedInput { line: 0, reason },
            OldiesError::IoError(e) => NeuroMLError::Resource(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_conversion() {
        let e: NeuroMLError = OldiesError::InvalidAddress("[9]".into()).into();
        assert!(matches!(e, NeuroMLError::InvalidArgument(_)));

        let e: NeuroMLError = OldiesError::ParseError("x".into()).into();
        assert!(matches!(e, NeuroMLError::MalformedInput { line: 0, .. }));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: NeuroMLError = OldiesError::IoError(io).into();
        assert!(matches!(e, NeuroMLError::Resource(_)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            NeuroMLError::UnsupportedModel("IF_curr_exp".into()).to_string(),
            "Cell type IF_curr_exp is not available in NeuroML"
        );
        assert_eq!(
            NeuroMLError::MalformedInput {
                line: 3,
                reason: "expected 4 fields".into()
            }
            .to_string(),
            "Malformed input at line 3: expected 4 fields"
        );
    }
}
