//! JSON network descriptions.
//!
//! A whole export in one file: session parameters, populations and
//! projections. Connection methods keep their PyNN names and parameter
//! shapes (see [`ConnectionMethod::from_parameters`]).
//!
//! ```json
//! {
//!   "setup": {"file": "brunel.xml", "timestep": 0.1},
//!   "populations": [
//!     {"label": "exc", "dims": [20, 20], "cell_type": "IF_cond_exp"},
//!     {"label": "inh", "dims": [100], "cell_type": "IF_cond_alpha",
//!      "parameters": {"tau_m": 10.0}}
//!   ],
//!   "projections": [
//!     {"pre": "exc", "post": "inh", "method": "fixedProbability", "parameters": 0.1},
//!     {"pre": "inh", "post": "exc", "method": "fixedNumberPost", "parameters": {"n": 5},
//!      "target": "inhibitory"}
//!   ]
//! }
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::celltype::{CellModel, CellParameters};
use crate::connectors::ConnectionMethod;
use crate::population::Population;
use crate::projection::{Projection, SynapseTarget};
use crate::session::{setup, Session, SetupConfig};
use crate::{NeuroMLError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub dims: Vec<usize>,
    pub cell_type: CellModel,
    #[serde(default)]
    pub parameters: CellParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub pre: String,
    pub post: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub target: Option<SynapseTarget>,
}

fn default_method() -> String {
    "allToAll".to_string()
}

/// A complete network, ready to be exported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub setup: SetupConfig,
    #[serde(default)]
    pub populations: Vec<PopulationSpec>,
    #[serde(default)]
    pub projections: Vec<ProjectionSpec>,
}

/// Counts of what an export produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub populations: usize,
    pub cells: usize,
    pub projections: usize,
}

impl NetworkDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| NeuroMLError::MalformedInput {
            line: e.line(),
            reason: e.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Create every population, then every projection, in file order
    pub fn build(&self, session: &mut Session) -> Result<(Vec<Population>, Vec<Projection>)> {
        let mut populations = Vec::with_capacity(self.populations.len());
        for spec in &self.populations {
            populations.push(session.create_population(
                &spec.dims,
                spec.cell_type,
                &spec.parameters,
                spec.label.as_deref(),
            )?);
        }

        let by_label: HashMap<&str, &Population> =
            populations.iter().map(|p| (p.label(), p)).collect();
        let lookup = |label: &str| {
            by_label.get(label).copied().ok_or_else(|| {
                NeuroMLError::InvalidArgument(format!("no population labelled {:?}", label))
            })
        };

        let mut projections = Vec::with_capacity(self.projections.len());
        for spec in &self.projections {
            let pre = lookup(&spec.pre)?;
            let post = lookup(&spec.post)?;
            let method = ConnectionMethod::from_parameters(&spec.method, &spec.parameters)?;
            projections.push(session.create_projection(
                pre,
                post,
                method,
                spec.target,
                spec.label.as_deref(),
            )?);
        }

        Ok((populations, projections))
    }

    /// Export to the file named in `setup`
    pub fn export(&self) -> Result<ExportSummary> {
        let session = setup(self.setup.clone())?;
        self.export_session(session)
    }

    /// Export to any sink, ignoring `setup.file`
    pub fn export_to<W: Write + 'static>(&self, sink: W) -> Result<ExportSummary> {
        let session = Session::with_writer(self.setup.clone(), sink)?;
        self.export_session(session)
    }

    fn export_session(&self, mut session: Session) -> Result<ExportSummary> {
        let (populations, projections) = self.build(&mut session)?;
        session.close()?;

        let summary = ExportSummary {
            populations: populations.len(),
            cells: populations.iter().map(Population::size).sum(),
            projections: projections.len(),
        };
        info!(
            "exported {} populations ({} cells) and {} projections",
            summary.populations, summary.cells, summary.projections
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::parse_connection_file;
    use std::io::Cursor;

    const BRUNEL: &str = r#"{
        "setup": {"file": "brunel.xml"},
        "populations": [
            {"label": "exc", "dims": [4, 5], "cell_type": "IF_cond_exp"},
            {"label": "inh", "dims": [5], "cell_type": "IF_cond_alpha", "parameters": {"tau_m": 10.0}}
        ],
        "projections": [
            {"pre": "exc", "post": "inh", "method": "fixedProbability", "parameters": 0.1},
            {"pre": "inh", "post": "exc", "method": "fixedNumberPost",
             "parameters": {"n": 5, "allow_self_connections": false}, "target": "inhibitory"},
            {"pre": "exc", "post": "exc"}
        ]
    }"#;

    #[test]
    fn test_parse_description() {
        let description = NetworkDescription::from_json(BRUNEL).unwrap();
        assert_eq!(description.setup.file, Path::new("brunel.xml"));
        assert_eq!(description.setup.timestep, 0.1);
        assert_eq!(description.populations.len(), 2);
        assert_eq!(description.populations[1].cell_type, CellModel::IfCondAlpha);
        assert_eq!(description.populations[1].parameters["tau_m"], 10.0);
        assert_eq!(description.projections[1].target, Some(SynapseTarget::Inhibitory));
        assert_eq!(description.projections[2].method, "allToAll");
    }

    #[test]
    fn test_malformed_json() {
        let text = "{\n  \"populations\": [\n    {\"dims\": [2], \"cell_type\": \"IF_cond_exp\"\n";
        assert!(matches!(
            NetworkDescription::from_json(text),
            Err(NeuroMLError::MalformedInput { .. })
        ));
        assert!(NetworkDescription::from_json(r#"{"populations": [{"dims": [2], "cell_type": "HH"}]}"#).is_err());
    }

    #[test]
    fn test_build_session() {
        let description = NetworkDescription::from_json(BRUNEL).unwrap();
        let mut session = Session::with_writer(description.setup.clone(), Vec::new()).unwrap();
        let (populations, projections) = description.build(&mut session).unwrap();

        assert_eq!(populations[0].size(), 20);
        assert_eq!(populations[1].celltype().label(), "IF_cond_alpha_inh");
        let labels: Vec<&str> = projections.iter().map(Projection::label).collect();
        assert_eq!(labels, vec!["Projection0", "Projection1", "Projection2"]);
        assert_eq!(projections[1].target(), SynapseTarget::Inhibitory);

        let document = session.document();
        let per_cell = document
            .root()
            .find("net:projections")
            .unwrap()
            .children()[1]
            .find("net:connectivity_pattern/net:per_cell_connection")
            .unwrap();
        assert_eq!(per_cell.attribute("direction"), Some("PostToPre"));
        assert_eq!(per_cell.attribute("allow_self_connections"), Some("0"));
        session.close().unwrap();
    }

    #[test]
    fn test_unknown_population() {
        let description = NetworkDescription::from_json(
            r#"{"populations": [{"label": "a", "dims": [2], "cell_type": "IF_cond_exp"}],
                "projections": [{"pre": "a", "post": "b"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            description.export_to(Vec::new()),
            Err(NeuroMLError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_export_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = dir.path().join("exc_inh.conn");
        fs::write(&conn, "[0, 0]\t[1]\t0.5\t1.0\n[3, 4]\t[4]\t0.25\t2.0\n").unwrap();

        let mut description = NetworkDescription::from_json(BRUNEL).unwrap();
        description.setup.file = dir.path().join("brunel.xml");
        description.projections.push(ProjectionSpec {
            label: Some("from_file".into()),
            pre: "exc".into(),
            post: "inh".into(),
            method: "fromFile".into(),
            parameters: Value::String(conn.display().to_string()),
            target: None,
        });

        let summary = description.export().unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                populations: 2,
                cells: 25,
                projections: 4
            }
        );

        let text = fs::read_to_string(&description.setup.file).unwrap();
        let xml = roxmltree::Document::parse(&text).unwrap();
        let connections = xml
            .descendants()
            .filter(|n| n.tag_name().name() == "connection")
            .count();
        assert_eq!(connections, 2);

        let records = parse_connection_file(Cursor::new(fs::read_to_string(&conn).unwrap())).unwrap();
        assert_eq!(records[1].pre, vec![3, 4]);
    }
}
