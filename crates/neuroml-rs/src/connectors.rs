//! Connection methods and their NetworkML connectivity sub-trees.
//!
//! | Method | Output |
//! |--------|--------|
//! | allToAll | `net:connectivity_pattern/net:all_to_all` |
//! | oneToOne | `net:connectivity_pattern/net:one_to_one` |
//! | fixedProbability | `net:connectivity_pattern/net:fixed_probability` |
//! | fixedNumberPre / fixedNumberPost | `net:connectivity_pattern/net:per_cell_connection` |
//! | distanceDependentProbability | not available |
//! | fromList / fromFile | `net:connections`, one `net:connection` per edge |
//!
//! Only the list forms enumerate edges. The patterns are declarative, so
//! `allow_self_connections` is written out as a flag and never applied here.

use log::debug;
use oldies_core::random::{RandomDistribution, SeededRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::document::{Namespace, Node};
use crate::population::Population;
use crate::{NeuroMLError, Result};

/// PyNN method names, in the order they are documented
pub const METHODS: &[&str] = &[
    "allToAll",
    "oneToOne",
    "fixedProbability",
    "distanceDependentProbability",
    "fixedNumberPre",
    "fixedNumberPost",
    "fromList",
    "fromFile",
];

// ============================================================================
// TYPES
// ============================================================================

/// One explicit connection: pre address, post address, weight, delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub pre: Vec<usize>,
    pub post: Vec<usize>,
    pub weight: f64,
    pub delay: f64,
}

impl ConnectionRecord {
    pub fn new(pre: &[usize], post: &[usize], weight: f64, delay: f64) -> Self {
        Self {
            pre: pre.to_vec(),
            post: post.to_vec(),
            weight,
            delay,
        }
    }
}

/// Which side of a fixed-number connection has the fixed count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Each presynaptic cell makes `n` connections
    PreToPost,
    /// Each postsynaptic cell receives `n` connections
    PostToPre,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::PreToPost => "PreToPost",
            Direction::PostToPre => "PostToPre",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connections per cell: fixed, or drawn per cell
#[derive(Debug, Clone)]
pub enum ConnectionCount {
    Fixed(usize),
    Distributed(RandomDistribution),
}

#[derive(Debug, Clone)]
pub struct FixedNumber {
    pub count: ConnectionCount,
    pub allow_self_connections: bool,
}

/// How the cells of two populations are connected
#[derive(Debug, Clone)]
pub enum ConnectionMethod {
    AllToAll {
        allow_self_connections: bool,
    },
    OneToOne,
    FixedProbability {
        p_connect: f64,
        allow_self_connections: bool,
    },
    /// `d_expression` is a probability expression in the distance `d`
    DistanceDependentProbability {
        d_expression: String,
    },
    FixedNumberPre(FixedNumber),
    FixedNumberPost(FixedNumber),
    FromList(Vec<ConnectionRecord>),
    /// Tab-separated `src tgt weight delay` table
    FromFile(PathBuf),
}

impl Default for ConnectionMethod {
    fn default() -> Self {
        Self::all_to_all()
    }
}

impl ConnectionMethod {
    pub fn all_to_all() -> Self {
        ConnectionMethod::AllToAll {
            allow_self_connections: true,
        }
    }

    pub fn one_to_one() -> Self {
        ConnectionMethod::OneToOne
    }

    pub fn fixed_probability(p_connect: f64) -> Self {
        ConnectionMethod::FixedProbability {
            p_connect,
            allow_self_connections: true,
        }
    }

    pub fn distance_dependent(d_expression: &str) -> Self {
        ConnectionMethod::DistanceDependentProbability {
            d_expression: d_expression.to_string(),
        }
    }

    pub fn fixed_number_pre(n: usize) -> Self {
        ConnectionMethod::FixedNumberPre(FixedNumber {
            count: ConnectionCount::Fixed(n),
            allow_self_connections: true,
        })
    }

    pub fn fixed_number_post(n: usize) -> Self {
        ConnectionMethod::FixedNumberPost(FixedNumber {
            count: ConnectionCount::Fixed(n),
            allow_self_connections: true,
        })
    }

    pub fn from_list(records: Vec<ConnectionRecord>) -> Self {
        ConnectionMethod::FromList(records)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Self {
        ConnectionMethod::FromFile(path.as_ref().to_path_buf())
    }

    /// PyNN name of the method
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionMethod::AllToAll { .. } => "allToAll",
            ConnectionMethod::OneToOne => "oneToOne",
            ConnectionMethod::FixedProbability { .. } => "fixedProbability",
            ConnectionMethod::DistanceDependentProbability { .. } => "distanceDependentProbability",
            ConnectionMethod::FixedNumberPre(_) => "fixedNumberPre",
            ConnectionMethod::FixedNumberPost(_) => "fixedNumberPost",
            ConnectionMethod::FromList(_) => "fromList",
            ConnectionMethod::FromFile(_) => "fromFile",
        }
    }

    /// Build a method from its PyNN name and loosely typed parameters.
    ///
    /// Accepts the shapes PyNN scripts pass around: `null` or an object for
    /// the flag-only methods, a bare number for `fixedProbability` and the
    /// fixed-number methods, a string for `distanceDependentProbability` and
    /// `fromFile`, and an array of `[pre, post, weight, delay]` for
    /// `fromList`. A random count is written as
    /// `{"rand_distr": {"distribution": "uniform", "parameters": [1, 5], "seed": 3}}`.
    pub fn from_parameters(method: &str, parameters: &Value) -> Result<Self> {
        match method {
            "allToAll" => {
                let allow_self_connections = self_connection_flag(method, parameters)?;
                Ok(ConnectionMethod::AllToAll {
                    allow_self_connections,
                })
            }
            "oneToOne" => match parameters {
                Value::Null => Ok(ConnectionMethod::OneToOne),
                Value::Object(map) if map.is_empty() => Ok(ConnectionMethod::OneToOne),
                other => Err(wrong_shape(method, "no parameters", other)),
            },
            "fixedProbability" => {
                let p_connect = match parameters {
                    Value::Number(_) => number(method, parameters)?,
                    Value::Object(map) => match map.get("p_connect") {
                        Some(p) => number(method, p)?,
                        None => return Err(wrong_shape(method, "a p_connect entry", parameters)),
                    },
                    other => return Err(wrong_shape(method, "a probability", other)),
                };
                Ok(ConnectionMethod::FixedProbability {
                    p_connect,
                    allow_self_connections: bare_or_flagged(method, parameters)?,
                })
            }
            "distanceDependentProbability" => {
                let expression = match parameters {
                    Value::String(s) => s.as_str(),
                    Value::Object(map) => map
                        .get("d_expression")
                        .and_then(Value::as_str)
                        .ok_or_else(|| wrong_shape(method, "a d_expression string", parameters))?,
                    other => return Err(wrong_shape(method, "an expression string", other)),
                };
                Ok(ConnectionMethod::distance_dependent(expression))
            }
            "fixedNumberPre" => Ok(ConnectionMethod::FixedNumberPre(fixed_number(
                method, parameters,
            )?)),
            "fixedNumberPost" => Ok(ConnectionMethod::FixedNumberPost(fixed_number(
                method, parameters,
            )?)),
            "fromList" => {
                let Value::Array(rows) = parameters else {
                    return Err(wrong_shape(method, "a list of connections", parameters));
                };
                rows.iter()
                    .map(|row| connection_record(method, row))
                    .collect::<Result<Vec<_>>>()
                    .map(ConnectionMethod::FromList)
            }
            "fromFile" => match parameters {
                Value::String(path) => Ok(ConnectionMethod::from_file(path)),
                other => Err(wrong_shape(method, "a file name", other)),
            },
            other => Err(NeuroMLError::InvalidArgument(format!(
                "unknown connection method {:?}, expected one of {:?}",
                other, METHODS
            ))),
        }
    }
}

// ============================================================================
// PARAMETER SHAPES
// ============================================================================

fn wrong_shape(method: &str, expected: &str, got: &Value) -> NeuroMLError {
    NeuroMLError::InvalidArgument(format!("{} expects {}, got {}", method, expected, got))
}

fn number(method: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| wrong_shape(method, "a number", value))
}

fn flag(method: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(wrong_shape(method, "a boolean flag", value)),
        },
        other => Err(wrong_shape(method, "a boolean flag", other)),
    }
}

/// `allow_self_connections` from an object, true when absent
fn self_connection_flag(method: &str, parameters: &Value) -> Result<bool> {
    match parameters {
        Value::Object(map) => match map.get("allow_self_connections") {
            Some(v) => flag(method, v),
            None => Ok(true),
        },
        Value::Null => Ok(true),
        other => Err(wrong_shape(method, "an object", other)),
    }
}

/// A bare number carries no flag
fn bare_or_flagged(method: &str, parameters: &Value) -> Result<bool> {
    match parameters {
        Value::Number(_) => Ok(true),
        other => self_connection_flag(method, other),
    }
}

/// Non-negative integer, also written as an integral float (`5.0`)
fn count(method: &str, value: &Value) -> Result<usize> {
    let integral = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    });
    integral
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| wrong_shape(method, "a non-negative integer", value))
}

fn random_distribution(method: &str, value: &Value) -> Result<RandomDistribution> {
    let Value::Object(map) = value else {
        return Err(wrong_shape(method, "a random distribution object", value));
    };
    let name = map
        .get("distribution")
        .and_then(Value::as_str)
        .ok_or_else(|| wrong_shape(method, "a distribution name", value))?;
    let parameters = match map.get("parameters") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| number(method, v))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => return Err(wrong_shape(method, "a parameter list", other)),
    };
    let seed = match map.get("seed") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .ok_or_else(|| wrong_shape(method, "an integer seed", v))?,
        ),
    };
    Ok(RandomDistribution::new(
        name,
        parameters,
        Some(SeededRng::new(seed)),
    )?)
}

fn fixed_number(method: &str, parameters: &Value) -> Result<FixedNumber> {
    let count = match parameters {
        Value::Number(_) => ConnectionCount::Fixed(count(method, parameters)?),
        Value::Object(map) => {
            if let Some(n) = map.get("n") {
                ConnectionCount::Fixed(count(method, n)?)
            } else if let Some(distribution) = map.get("rand_distr") {
                ConnectionCount::Distributed(random_distribution(method, distribution)?)
            } else {
                return Err(wrong_shape(method, "an n or rand_distr entry", parameters));
            }
        }
        other => {
            return Err(wrong_shape(
                method,
                "an integer, an object or a random distribution",
                other,
            ))
        }
    };
    Ok(FixedNumber {
        count,
        allow_self_connections: bare_or_flagged(method, parameters)?,
    })
}

fn address(method: &str, value: &Value) -> Result<Vec<usize>> {
    match value {
        Value::Number(_) => Ok(vec![count(method, value)?]),
        Value::Array(coords) => coords.iter().map(|c| count(method, c)).collect(),
        other => Err(wrong_shape(method, "a cell address", other)),
    }
}

fn connection_record(method: &str, row: &Value) -> Result<ConnectionRecord> {
    match row.as_array().map(Vec::as_slice) {
        Some([pre, post, weight, delay]) => Ok(ConnectionRecord {
            pre: address(method, pre)?,
            post: address(method, post)?,
            weight: number(method, weight)?,
            delay: number(method, delay)?,
        }),
        _ => Err(wrong_shape(method, "[pre, post, weight, delay]", row)),
    }
}

// ============================================================================
// CONNECTION FILES
// ============================================================================

/// Read a tab-separated connection table.
///
/// Every non-blank line is `src<TAB>tgt<TAB>weight<TAB>delay`. The address
/// fields may carry a prefix such as a population label: only the part from
/// the first `[` on is read.
pub fn parse_connection_file<R: BufRead>(reader: R) -> Result<Vec<ConnectionRecord>> {
    let mut records = Vec::new();
    for (i, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let line_number = i + 1;
        let malformed = |reason: String| NeuroMLError::MalformedInput {
            line: line_number,
            reason,
        };
        let line = String::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;

        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [src, tgt, weight, delay] = fields.as_slice() else {
            return Err(malformed(format!(
                "expected 4 tab-separated fields, found {}",
                fields.len()
            )));
        };

        let address = |field: &str| -> Result<Vec<usize>> {
            let start = field
                .find('[')
                .ok_or_else(|| malformed(format!("no address in {:?}", field)))?;
            oldies_core::parse_address(&field[start..]).map_err(|e| malformed(e.to_string()))
        };
        let value = |field: &str, what: &str| -> Result<f64> {
            field
                .trim()
                .parse::<f64>()
                .map_err(|e| malformed(format!("bad {} {:?}: {}", what, field, e)))
        };

        records.push(ConnectionRecord {
            pre: address(*src)?,
            post: address(*tgt)?,
            weight: value(*weight, "weight")?,
            delay: value(*delay, "delay")?,
        });
    }
    Ok(records)
}

// ============================================================================
// CONNECTIVITY
// ============================================================================

fn pattern(child: Node) -> Node {
    Node::new(Namespace::Net, "connectivity_pattern").with_child(child)
}

fn fixed_number_node(fixed: &FixedNumber, direction: Direction) -> Result<Node> {
    match &fixed.count {
        ConnectionCount::Fixed(0) => Err(NeuroMLError::InvalidArgument(
            "the number of connections per cell must be positive".into(),
        )),
        ConnectionCount::Fixed(n) => Ok(pattern(
            Node::new(Namespace::Net, "per_cell_connection")
                .with_attr("num_per_source", *n)
                .with_attr("direction", direction.as_str())
                .with_attr("allow_self_connections", fixed.allow_self_connections),
        )),
        ConnectionCount::Distributed(distribution) => Err(NeuroMLError::NotImplemented(format!(
            "connections with a variable number per cell ({} distribution)",
            distribution.name()
        ))),
    }
}

fn connection_list(pre: &Population, post: &Population, records: &[ConnectionRecord]) -> Result<Node> {
    let mut connections = Node::new(Namespace::Net, "connections");
    for (i, record) in records.iter().enumerate() {
        let src = pre.index_of(&record.pre)?;
        let tgt = post.index_of(&record.post)?;
        connections.append_child(
            Node::new(Namespace::Net, "connection")
                .with_attr("id", i)
                .with_child(Node::new(Namespace::Net, "pre").with_attr("cell_id", src))
                .with_child(Node::new(Namespace::Net, "post").with_attr("cell_id", tgt))
                .with_child(
                    Node::new(Namespace::Net, "properties")
                        .with_attr("internal_delay", record.delay)
                        .with_attr("weight", record.weight),
                ),
        );
    }
    Ok(connections)
}

/// Connectivity sub-tree of a projection from `pre` to `post`
pub fn generate_connectivity(
    pre: &Population,
    post: &Population,
    method: &ConnectionMethod,
) -> Result<Node> {
    match method {
        ConnectionMethod::AllToAll {
            allow_self_connections,
        } => Ok(pattern(
            Node::new(Namespace::Net, "all_to_all")
                .with_attr("allow_self_connections", *allow_self_connections),
        )),
        ConnectionMethod::OneToOne => {
            if pre.size() != post.size() {
                return Err(NeuroMLError::InvalidArgument(format!(
                    "oneToOne needs populations of equal size, got {} and {}",
                    pre.size(),
                    post.size()
                )));
            }
            Ok(pattern(Node::new(Namespace::Net, "one_to_one")))
        }
        ConnectionMethod::FixedProbability {
            p_connect,
            allow_self_connections,
        } => {
            if !(0.0..=1.0).contains(p_connect) {
                return Err(NeuroMLError::InvalidArgument(format!(
                    "connection probability must be in [0, 1], got {}",
                    p_connect
                )));
            }
            Ok(pattern(
                Node::new(Namespace::Net, "fixed_probability")
                    .with_attr("probability", *p_connect)
                    .with_attr("allow_self_connections", *allow_self_connections),
            ))
        }
        ConnectionMethod::DistanceDependentProbability { d_expression } => {
            Err(NeuroMLError::NotImplemented(format!(
                "distance-dependent connection probability ({:?})",
                d_expression
            )))
        }
        ConnectionMethod::FixedNumberPre(fixed) => fixed_number_node(fixed, Direction::PreToPost),
        ConnectionMethod::FixedNumberPost(fixed) => fixed_number_node(fixed, Direction::PostToPre),
        ConnectionMethod::FromList(records) => connection_list(pre, post, records),
        ConnectionMethod::FromFile(path) => {
            let file = File::open(path)?;
            let records = parse_connection_file(BufReader::new(file))?;
            debug!("read {} connections from {}", records.len(), path.display());
            connection_list(pre, post, &records)
        }
    }
}
