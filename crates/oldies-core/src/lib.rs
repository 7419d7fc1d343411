//! # OldiesRules Core
//!
//! Shared bookkeeping for the PyNN -> NeuroML export engine.
//!
//! PyNN (2007-) is a simulator-independent Python API for describing spiking
//! networks. Its backends inherit a common population base that knows about
//! sizes, dimensions and cell addresses; this crate is that base, kept free of
//! any document emission.
//!
//! ## Contents
//!
//! | Item | PyNN counterpart | Purpose |
//! |------|------------------|---------|
//! | [`Address`] | `p[3, 4]` cell lookup | Coordinates of one cell |
//! | [`PopulationLayout`] | `common.Population` | Dimensions, addresses, positions |
//! | [`parse_address`] | `eval("[3, 4]")` | Address literals in connection files |
//! | [`random`] | `pyNN.random` | Random sources and distributions |
//!
//! ## Design Philosophy
//!
//! 1. Same index <-> address mapping as PyNN (row-major)
//! 2. Modern Rust safety: every lookup is checked and returns a [`Result`]
//! 3. No global state

use ndarray::Array2;
use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod random;

/// Common errors
#[derive(Debug, Error)]
pub enum OldiesError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OldiesError>;

/// Spatial position (micron)
pub type Position = [f64; 3];

/// Number of spatial axes a position carries
pub const SPATIAL_DIMENSIONS: usize = 3;

// ============================================================================
// ADDRESSES
// ============================================================================

/// Address of one cell inside a population.
///
/// Holds one coordinate per population dimension together with the flat
/// index it maps to. The mapping is row-major: the last dimension varies
/// fastest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    coords: Vec<usize>,
    index: usize,
}

impl Address {
    /// Coordinates, one per dimension
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// Flat index within the population
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.coords.len()
    }
}

// ============================================================================
// POPULATION LAYOUT
// ============================================================================

/// Dimensions, addresses and positions of a population.
///
/// Positions follow the PyNN grid convention: the first three address
/// coordinates become x, y and z. Populations with fewer than three
/// dimensions are padded with zeros, extra dimensions are dropped. The
/// projection is lossy on purpose, NeuroML only knows three axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationLayout {
    dims: Vec<usize>,
    size: usize,
    /// Shape (3, size), one column per cell
    positions: Array2<f64>,
}

impl PopulationLayout {
    /// Create a layout from the population dimensions
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() {
            return Err(OldiesError::InvalidArgument(
                "a population needs at least one dimension".into(),
            ));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(OldiesError::InvalidArgument(format!(
                "dimension {} of {:?} is zero",
                pos, dims
            )));
        }
        let size = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                OldiesError::InvalidArgument(format!("population size {:?} overflows", dims))
            })?;

        let mut positions = Array2::zeros((SPATIAL_DIMENSIONS, size));
        for index in 0..size {
            let coords = unravel(index, dims);
            for (axis, &c) in coords.iter().take(SPATIAL_DIMENSIONS).enumerate() {
                positions[[axis, index]] = c as f64;
            }
        }

        Ok(Self {
            dims: dims.to_vec(),
            size,
            positions,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of cells (product of the dimensions)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Address of the cell at a flat index
    pub fn address(&self, index: usize) -> Result<Address> {
        if index >= self.size {
            return Err(OldiesError::InvalidAddress(format!(
                "index {} out of range for population of size {}",
                index, self.size
            )));
        }
        Ok(Address {
            coords: unravel(index, &self.dims),
            index,
        })
    }

    /// Flat index of the cell at the given coordinates
    pub fn index_of(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.dims.len() {
            return Err(OldiesError::InvalidAddress(format!(
                "address {:?} has {} coordinates, population has {} dimensions",
                coords,
                coords.len(),
                self.dims.len()
            )));
        }
        let mut index = 0;
        for (axis, (&c, &d)) in coords.iter().zip(&self.dims).enumerate() {
            if c >= d {
                return Err(OldiesError::InvalidAddress(format!(
                    "coordinate {} of {:?} exceeds dimension {:?}",
                    axis, coords, self.dims
                )));
            }
            index = index * d + c;
        }
        Ok(index)
    }

    /// All addresses in flat-index order
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        (0..self.size).map(move |index| Address {
            coords: unravel(index, &self.dims),
            index,
        })
    }

    /// Position of one cell
    pub fn position(&self, index: usize) -> Result<Position> {
        if index >= self.size {
            return Err(OldiesError::InvalidAddress(format!(
                "index {} out of range for population of size {}",
                index, self.size
            )));
        }
        let column = self.positions.column(index);
        Ok([column[0], column[1], column[2]])
    }

    /// Position matrix, shape (3, size)
    pub fn positions(&self) -> &Array2<f64> {
        &self.positions
    }
}

/// Row-major unravelling of a flat index
fn unravel(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (slot, &d) in coords.iter_mut().zip(dims).rev() {
        *slot = index % d;
        index /= d;
    }
    coords
}

// ============================================================================
// ADDRESS LITERALS
// ============================================================================

/// Grammar for bracketed address literals such as `[3, 4]`
#[derive(Parser)]
#[grammar_inline = r#"
WHITESPACE = _{ " " | "\t" }

index = @{ ASCII_DIGIT+ }
coords = { index ~ ("," ~ index)* ~ ","? }
address = { SOI ~ "[" ~ coords? ~ "]" ~ EOI }
"#]
pub struct AddressParser;

/// Parse an address literal like `[0]` or `[2, 5]` into coordinates
pub fn parse_address(literal: &str) -> Result<Vec<usize>> {
    let mut pairs = AddressParser::parse(Rule::address, literal.trim())
        .map_err(|e| OldiesError::ParseError(format!("bad address {:?}: {}", literal, e)))?;

    let mut coords = Vec::new();
    let Some(address) = pairs.next() else {
        return Ok(coords);
    };
    for pair in address.into_inner() {
        if pair.as_rule() != Rule::coords {
            continue;
        }
        for index in pair.into_inner() {
            let value = index.as_str().parse::<usize>().map_err(|e| {
                OldiesError::ParseError(format!("bad coordinate {:?}: {}", index.as_str(), e))
            })?;
            coords.push(value);
        }
    }
    Ok(coords)
}
