//! Patch file format and operations.

use std::path::Path;

use serde::{Deserialize, Serialize};
use waviate_core::{Catalog, Graph, GraphDocument, GraphError, NodeId, Value, ValueType};

use crate::error::{ConfigError, write_with_parents};
use crate::validation::validate_patch;

/// A persisted graph plus the node it renders.
///
/// # TOML Format
///
/// ```toml
/// name = "tone"
/// output = 2
/// externals = [[440.0]]
///
/// [[graph.nodes]]
/// operator = 2
///
/// [[graph.nodes]]
/// operator = 8
/// inputs = [0]
///
/// [[graph.nodes]]
/// operator = 1
/// inputs = [1]
/// ```
///
/// `output` and every input index refer to positions in `graph.nodes`.
/// `externals` lists one vector per graph input, in placement order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    /// Name of the patch.
    pub name: String,

    /// Optional description of the patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Index of the output record.
    #[serde(default)]
    pub output: usize,

    /// Values for graph inputs, in placement order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub externals: Vec<Vec<f64>>,

    /// The graph records.
    #[serde(default)]
    pub graph: GraphDocument,
}

impl Patch {
    /// Create an empty patch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            output: 0,
            externals: Vec::new(),
            graph: GraphDocument::default(),
        }
    }

    /// Create a patch with a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the external input vectors.
    pub fn with_externals(mut self, externals: Vec<Vec<f64>>) -> Self {
        self.externals = externals;
        self
    }

    /// Captures `graph` with `output` as the rendered node.
    pub fn from_graph(name: impl Into<String>, graph: &Graph, output: NodeId) -> Result<Self, ConfigError> {
        let output = graph
            .document_index(output)
            .ok_or(GraphError::NodeNotFound(output))?;
        Ok(Self {
            output,
            graph: graph.to_document(),
            ..Self::new(name)
        })
    }

    /// Validates the patch and rebuilds its graph against `catalog`.
    ///
    /// Returns the graph and the handle of the output node.
    pub fn build(&self, catalog: &Catalog) -> Result<(Graph, NodeId), ConfigError> {
        validate_patch(self, catalog)?;
        let (graph, handles) = Graph::from_document(&self.graph, catalog)?;
        Ok((graph, handles[self.output]))
    }

    /// External vectors as engine values, each read as the type its graph
    /// input resolved to.
    pub fn external_values(&self, graph: &Graph) -> Vec<Vec<Value>> {
        let inputs = graph.input_nodes();
        self.externals
            .iter()
            .enumerate()
            .map(|(i, xs)| {
                let ty = inputs
                    .get(i)
                    .and_then(|&n| graph.resolved_type(n))
                    .and_then(|t| t.value_type())
                    .unwrap_or(ValueType::Decimal);
                xs.iter().map(|&x| Value::from_literal(x, ty)).collect()
            })
            .collect()
    }

    /// Load a patch from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a patch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the patch to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_with_parents(path.as_ref(), &self.to_toml()?)
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.graph.nodes.len()
    }

    /// Check if the patch has no records.
    pub fn is_empty(&self) -> bool {
        self.graph.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    const TONE: &str = r#"
name = "tone"
output = 2
externals = [[0.5]]

[[graph.nodes]]
operator = 2

[[graph.nodes]]
operator = 8
inputs = [0]

[[graph.nodes]]
operator = 1
inputs = [1]
"#;

    #[test]
    fn test_parse_and_build() {
        let patch = Patch::from_toml(TONE).unwrap();
        assert_eq!(patch.len(), 3);
        assert_eq!(patch.graph.nodes[1].inputs, vec![0]);

        let catalog = waviate_ops::builtin_catalog();
        let (graph, output) = patch.build(&catalog).unwrap();
        assert_eq!(graph.input(output, 0).map(|n| graph.document_index(n)), Some(Some(1)));
        assert_eq!(patch.external_values(&graph), vec![vec![Value::decimal(0.5)]]);
    }

    #[test]
    fn test_build_rejects_bad_output() {
        let mut patch = Patch::from_toml(TONE).unwrap();
        patch.output = 9;
        let err = patch.build(&waviate_ops::builtin_catalog()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::OutputOutOfRange { output: 9, len: 3 })
        ));
    }

    #[test]
    fn test_externals_follow_input_type() {
        let catalog = waviate_ops::builtin_catalog();
        let mut g = Graph::new();
        let n = g.add_node(catalog.lookup(waviate_ops::id::INPUT).unwrap().clone()).unwrap();
        let repeat = g.add_node(catalog.lookup(waviate_ops::id::REPEAT).unwrap().clone()).unwrap();
        g.attach(repeat, 1, n).unwrap();

        let patch = Patch::from_graph("fill", &g, repeat)
            .unwrap()
            .with_externals(vec![vec![3.0]]);
        assert_eq!(patch.output, 1);
        assert_eq!(patch.external_values(&g), vec![vec![Value::integer(3)]]);
    }
}
