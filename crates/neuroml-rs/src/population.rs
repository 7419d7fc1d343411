//! Populations: one cell type laid out on a grid of addresses.

use ndarray::Array2;
use oldies_core::{Address, PopulationLayout};

use crate::celltype::{CellModel, CellParameters, CellTypeDescriptor};
use crate::document::{Namespace, Node};
use crate::Result;

/// A labeled group of cells sharing one cell type.
///
/// Created through [`Session::create_population`](crate::Session::create_population),
/// which also emits its document nodes.
#[derive(Debug, Clone)]
pub struct Population {
    label: String,
    layout: PopulationLayout,
    celltype: CellTypeDescriptor,
    session: u64,
}

impl Population {
    /// Build a population and label its cell type `"<Model>_<label>"`.
    pub(crate) fn new(
        dims: &[usize],
        model: CellModel,
        parameters: &CellParameters,
        label: &str,
        session: u64,
    ) -> Result<Self> {
        let layout = PopulationLayout::new(dims)?;
        let mut celltype = CellTypeDescriptor::new(model, parameters)?;
        celltype.set_label(&format!("{}_{}", model, label));
        Ok(Self {
            label: label.to_string(),
            layout,
            celltype,
            session,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of cells
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn celltype(&self) -> &CellTypeDescriptor {
        &self.celltype
    }

    /// Address of the cell with flat index `index`
    pub fn address(&self, index: usize) -> Result<Address> {
        Ok(self.layout.address(index)?)
    }

    /// Flat index of the cell at `coords`
    pub fn index_of(&self, coords: &[usize]) -> Result<usize> {
        Ok(self.layout.index_of(coords)?)
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.layout.addresses()
    }

    /// Positions, shape (3, size)
    pub fn positions(&self) -> &Array2<f64> {
        self.layout.positions()
    }

    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    /// `net:population` with the cell type reference and one instance per cell
    pub fn build_node(&self) -> Node {
        let mut instances = Node::new(Namespace::Net, "instances");
        for (i, column) in self.positions().columns().into_iter().enumerate() {
            instances.append_child(
                Node::new(Namespace::Net, "instance").with_attr("id", i).with_child(
                    Node::new(Namespace::Net, "location")
                        .with_attr("x", column[0])
                        .with_attr("y", column[1])
                        .with_attr("z", column[2]),
                ),
            );
        }

        Node::new(Namespace::Net, "population")
            .with_attr("name", self.label.as_str())
            .with_child(Node::new(Namespace::Net, "cell_type").with_text(self.celltype.label()))
            .with_child(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NeuroMLError;

    fn population(dims: &[usize]) -> Population {
        Population::new(dims, CellModel::IfCondExp, &CellParameters::new(), "grid", 0).unwrap()
    }

    #[test]
    fn test_celltype_label() {
        let p = population(&[4]);
        assert_eq!(p.label(), "grid");
        assert_eq!(p.celltype().label(), "IF_cond_exp_grid");
    }

    #[test]
    fn test_addresses() {
        let p = population(&[2, 3]);
        assert_eq!(p.size(), 6);
        assert_eq!(p.dims(), &[2, 3]);
        assert_eq!(p.index_of(&[1, 2]).unwrap(), 5);
        assert_eq!(p.address(4).unwrap().coords(), &[1, 1]);
        assert_eq!(p.addresses().count(), 6);
        assert!(matches!(p.index_of(&[2, 0]), Err(NeuroMLError::InvalidArgument(_))));
        assert!(matches!(p.address(6), Err(NeuroMLError::InvalidArgument(_))));
    }

    #[test]
    fn test_invalid_dims() {
        let result = Population::new(&[], CellModel::IfCondExp, &CellParameters::new(), "x", 0);
        assert!(matches!(result, Err(NeuroMLError::InvalidArgument(_))));
        let result = Population::new(&[3, 0], CellModel::IfCondExp, &CellParameters::new(), "x", 0);
        assert!(matches!(result, Err(NeuroMLError::InvalidArgument(_))));
    }

    #[test]
    fn test_population_node() {
        let p = population(&[2, 2]);
        let node = p.build_node();
        assert_eq!(node.qualified_name(), "net:population");
        assert_eq!(node.attribute("name"), Some("grid"));
        assert_eq!(node.child("net:cell_type").unwrap().text(), Some("IF_cond_exp_grid"));

        let instances = node.child("net:instances").unwrap();
        assert_eq!(instances.children().len(), 4);
        let last = &instances.children()[3];
        assert_eq!(last.attribute("id"), Some("3"));
        let location = last.child("net:location").unwrap();
        assert_eq!(location.attribute("x"), Some("1.0"));
        assert_eq!(location.attribute("y"), Some("1.0"));
        assert_eq!(location.attribute("z"), Some("0.0"));
    }
}
