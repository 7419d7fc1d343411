//! Export sessions.
//!
//! A [`Session`] owns the document being built and the sink it will be
//! written to. Every population and projection is turned into nodes the
//! moment it is created; [`Session::end`] drops the empty top-level sections
//! and writes the document out.
//!
//! ```text
//! neuroml
//! ├── cells                        one cell per population
//! ├── channels                     ion, channel and synapse types
//! ├── net:populations
//! ├── net:projections
//! └── net:inputs                   always empty, always pruned
//! ```

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::celltype::{CellModel, CellParameters};
use crate::connectors::ConnectionMethod;
use crate::document::{is_xml_text, neuroml_root, write_document, Document, Namespace, Node};
use crate::population::Population;
use crate::projection::{Projection, SynapseTarget};
use crate::{NeuroMLError, Result};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Session parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub file: PathBuf,   // Output NeuroML file
    pub timestep: f64,   // ms
    pub min_delay: f64,  // ms
    pub max_delay: f64,  // ms
    pub debug: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("network.xml"),
            timestep: 0.1,
            min_delay: 0.1,
            max_delay: 0.1,
            debug: false,
        }
    }
}

impl SetupConfig {
    /// Default parameters writing to `file`
    pub fn new(file: impl AsRef<Path>) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.timestep > 0.0) {
            return Err(NeuroMLError::InvalidArgument(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if !(self.min_delay > 0.0 && self.min_delay <= self.max_delay) {
            return Err(NeuroMLError::InvalidArgument(format!(
                "delays must satisfy 0 < min_delay <= max_delay, got {} and {}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Top-level sections in document order
#[derive(Debug, Clone)]
struct Sections {
    cells: Node,
    channels: Node,
    populations: Node,
    projections: Node,
    inputs: Node,
}

impl Sections {
    fn new() -> Self {
        Self {
            cells: Node::unqualified("cells"),
            channels: Node::unqualified("channels").with_attr("units", "Physiological Units"),
            populations: Node::new(Namespace::Net, "populations"),
            projections: Node::new(Namespace::Net, "projections")
                .with_attr("units", "Physiological Units"),
            inputs: Node::new(Namespace::Net, "inputs").with_attr("units", "Physiological Units"),
        }
    }

    fn in_order(&self) -> [&Node; 5] {
        [
            &self.cells,
            &self.channels,
            &self.populations,
            &self.projections,
            &self.inputs,
        ]
    }
}

/// Labels end up as attribute values and element text
fn check_label(kind: &str, label: &str) -> Result<()> {
    if !is_xml_text(label) {
        return Err(NeuroMLError::InvalidArgument(format!(
            "{} label {:?} contains characters not allowed in XML",
            kind, label
        )));
    }
    Ok(())
}

/// Open an output file and start a session writing to it
pub fn setup(config: SetupConfig) -> Result<Session> {
    config.validate()?;
    let file = File::create(&config.file)?;
    info!("writing NeuroML to {}", config.file.display());
    Session::with_writer(config, BufWriter::new(file))
}

/// One NeuroML document under construction.
///
/// Open until [`end`](Session::end) or [`close`](Session::close); every
/// operation on a closed session fails with [`NeuroMLError::SessionClosed`].
/// Dropping an open session releases the sink without writing anything.
pub struct Session {
    id: u64,
    config: SetupConfig,
    sink: Option<Box<dyn Write>>,
    sections: Sections,
    population_count: usize,
    projection_count: usize,
    population_labels: HashSet<String>,
    projection_labels: HashSet<String>,
    time: f64,
}

impl Session {
    /// Start a session writing to any sink
    pub fn with_writer<W: Write + 'static>(config: SetupConfig, sink: W) -> Result<Self> {
        config.validate()?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("session {} opened (timestep {} ms)", id, config.timestep);
        Ok(Self {
            id,
            config,
            sink: Some(Box::new(sink)),
            sections: Sections::new(),
            population_count: 0,
            projection_count: 0,
            population_labels: HashSet::new(),
            projection_labels: HashSet::new(),
            time: 0.0,
        })
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Simulated time accumulated by [`run`](Session::run)
    pub fn time(&self) -> f64 {
        self.time
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(NeuroMLError::SessionClosed)
        }
    }

    /// Create a population and emit its cell type, channels and instances.
    ///
    /// Without a label the population is called `Population<n>`, where `n`
    /// counts every call on this session, failed ones included.
    pub fn create_population(
        &mut self,
        dims: &[usize],
        model: CellModel,
        parameters: &CellParameters,
        label: Option<&str>,
    ) -> Result<Population> {
        self.ensure_open()?;
        let n = self.population_count;
        self.population_count += 1;

        let label = match label {
            Some(label) => label.to_string(),
            None => format!("Population{}", n),
        };
        check_label("population", &label)?;
        if self.population_labels.contains(&label) {
            return Err(NeuroMLError::InvalidArgument(format!(
                "population label {:?} is already in use",
                label
            )));
        }

        let population = Population::new(dims, model, parameters, &label, self.id)?;
        let population_node = population.build_node();
        let (cell_node, channel_nodes) = population.celltype().build_nodes();

        self.sections.cells.append_child(cell_node);
        for channel in channel_nodes {
            self.sections.channels.append_child(channel);
        }
        self.sections.populations.append_child(population_node);
        self.population_labels.insert(label);

        debug!(
            "population {}: {} x {:?} ({} cells)",
            population.label(),
            model,
            population.dims(),
            population.size()
        );
        Ok(population)
    }

    /// Connect two populations of this session.
    ///
    /// The synapse target defaults to the excitatory synapse. Auto-labels
    /// follow the same rule as populations (`Projection<n>`).
    pub fn create_projection(
        &mut self,
        pre: &Population,
        post: &Population,
        method: ConnectionMethod,
        target: Option<SynapseTarget>,
        label: Option<&str>,
    ) -> Result<Projection> {
        self.ensure_open()?;
        let n = self.projection_count;
        self.projection_count += 1;

        for population in [pre, post] {
            if population.session() != self.id
                || !self.population_labels.contains(population.label())
            {
                return Err(NeuroMLError::InvalidArgument(format!(
                    "population {:?} does not belong to this session",
                    population.label()
                )));
            }
        }

        let label = match label {
            Some(label) => label.to_string(),
            None => format!("Projection{}", n),
        };
        check_label("projection", &label)?;
        if self.projection_labels.contains(&label) {
            return Err(NeuroMLError::InvalidArgument(format!(
                "projection label {:?} is already in use",
                label
            )));
        }

        let (projection, node) =
            Projection::new(pre, post, &method, target.unwrap_or_default(), &label)?;
        self.sections.projections.append_child(node);
        self.projection_labels.insert(label);

        debug!(
            "projection {}: {} -> {} ({}, {})",
            projection.label(),
            projection.pre(),
            projection.post(),
            projection.method(),
            projection.target()
        );
        Ok(projection)
    }

    /// The document as it would be written now, empty sections removed
    pub fn document(&self) -> Document {
        let mut root = neuroml_root();
        for section in self.sections.in_order() {
            if section.has_children() {
                root.append_child(section.clone());
            }
        }
        Document::new(root)
    }

    /// Write the document and release the sink. The session is closed
    /// afterwards, even if writing fails.
    pub fn end(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Err(NeuroMLError::SessionClosed);
        };

        let pruned: Vec<String> = self
            .sections
            .in_order()
            .iter()
            .filter(|s| !s.has_children())
            .map(|s| s.qualified_name())
            .collect();
        if !pruned.is_empty() {
            info!("dropping empty sections: {}", pruned.join(", "));
        }

        let root = neuroml_root();
        let sections: Vec<&Node> = self
            .sections
            .in_order()
            .into_iter()
            .filter(|s| s.has_children())
            .collect();
        write_document(&mut sink, &root, &sections)?;
        sink.flush()?;
        info!(
            "session {} closed: {} populations, {} projections, {} elements",
            self.id,
            self.population_labels.len(),
            self.projection_labels.len(),
            1 + sections.iter().map(|s| s.count()).sum::<usize>()
        );
        Ok(())
    }

    /// [`end`](Session::end), consuming the session
    pub fn close(mut self) -> Result<()> {
        self.end()
    }

    // ------------------------------------------------------------------------
    // Run control. Nothing is simulated, these only keep scripts running.
    // ------------------------------------------------------------------------

    /// Advance the bookkeeping clock by `simtime` ms and return it
    pub fn run(&mut self, simtime: f64) -> Result<f64> {
        self.ensure_open()?;
        if !(simtime >= 0.0 && simtime.is_finite()) {
            return Err(NeuroMLError::InvalidArgument(format!(
                "simulation time must be a non-negative number, got {}",
                simtime
            )));
        }
        self.time += simtime;
        warn!("run({}): nothing is simulated when exporting to NeuroML", simtime);
        Ok(self.time)
    }

    /// Spike recording is not part of the exported document
    pub fn record(&mut self, population: &Population, filename: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        warn!(
            "record({}, {}): spike recording is not exported",
            population.label(),
            filename.as_ref().display()
        );
        Ok(())
    }

    /// Membrane potential recording is not part of the exported document
    pub fn record_v(&mut self, population: &Population, filename: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        warn!(
            "record_v({}, {}): membrane potential recording is not exported",
            population.label(),
            filename.as_ref().display()
        );
        Ok(())
    }

    pub fn set_rng_seeds(&mut self, _seeds: &[u64]) -> Result<()> {
        self.ensure_open()?;
        Err(NeuroMLError::NotImplemented("set_rng_seeds".into()))
    }

    // ------------------------------------------------------------------------
    // Low-level API. Individual cells have no NeuroML v1 representation.
    // ------------------------------------------------------------------------

    pub fn create(
        &mut self,
        _model: CellModel,
        _parameters: &CellParameters,
        _n: usize,
    ) -> Result<Vec<usize>> {
        self.ensure_open()?;
        Err(NeuroMLError::NotImplemented("create".into()))
    }

    pub fn connect(
        &mut self,
        _source: &[usize],
        _target: &[usize],
        _weight: Option<f64>,
        _delay: Option<f64>,
    ) -> Result<()> {
        self.ensure_open()?;
        Err(NeuroMLError::NotImplemented("connect".into()))
    }

    pub fn set(&mut self, _cells: &[usize], _parameters: &CellParameters) -> Result<()> {
        self.ensure_open()?;
        Err(NeuroMLError::NotImplemented("set".into()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.sink.is_some() {
            warn!(
                "session {} dropped while open, {} was not written",
                self.id,
                self.config.file.display()
            );
        }
    }
}
