//! Flat persistence records for a graph.
//!
//! A [`GraphDocument`] lists live nodes in handle order. Edges are stored as
//! indices into that list, `-1` meaning unattached. Loading a document is the
//! exact inverse of [`Graph::to_document`] and re-checks every structural rule
//! that [`Graph::attach`] enforces.

use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::error::GraphError;
use crate::operator::{NodeConfig, OperatorId};
use crate::value::{Value, ValueType};

use super::model::Graph;
use super::node::{NodeData, NodeId};

/// One node of a persisted graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeRecord {
    /// Local operator number.
    pub operator: u32,
    /// Operator owner scope (0 for built-ins).
    #[cfg_attr(feature = "serde", serde(default))]
    pub owner: u64,
    /// Producer index per slot, `-1` for unattached.
    #[cfg_attr(feature = "serde", serde(default))]
    pub inputs: Vec<i64>,
    /// Slot defaults as literals (integers and booleans stored exactly).
    #[cfg_attr(feature = "serde", serde(default))]
    pub defaults: Vec<f64>,
    /// Node properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub config: NodeConfig,
    /// Ordering key for graph inputs.
    #[cfg_attr(feature = "serde", serde(default))]
    pub placement: i32,
}

impl NodeRecord {
    /// A record with no edges and default slot values.
    pub fn new(operator: OperatorId) -> Self {
        Self {
            operator: operator.local,
            owner: operator.owner,
            inputs: Vec::new(),
            defaults: Vec::new(),
            config: NodeConfig::default(),
            placement: 0,
        }
    }

    /// The operator this record instantiates.
    pub fn operator_id(&self) -> OperatorId {
        OperatorId::new(self.owner, self.operator)
    }
}

/// A whole graph as a flat list of records.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphDocument {
    /// Nodes in handle order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub nodes: Vec<NodeRecord>,
}

fn encode(value: Value, ty: ValueType) -> f64 {
    match ty {
        ValueType::Integer | ValueType::Boolean => value.as_integer() as f64,
        ValueType::Decimal | ValueType::Any => value.as_decimal(),
    }
}

impl Graph {
    /// Position of `node` in [`to_document`](Self::to_document) output.
    pub fn document_index(&self, node: NodeId) -> Option<usize> {
        self.node_ids().position(|id| id == node)
    }

    /// Walks the graph into persistence records.
    pub fn to_document(&self) -> GraphDocument {
        let index: HashMap<NodeId, i64> = self
            .node_ids()
            .enumerate()
            .map(|(i, id)| (id, i as i64))
            .collect();

        let nodes = self
            .node_ids()
            .filter_map(|id| self.node(id))
            .map(|data| NodeRecord {
                operator: data.operator.id.local,
                owner: data.operator.id.owner,
                inputs: data
                    .inputs
                    .iter()
                    .map(|p| p.and_then(|p| index.get(&p).copied()).unwrap_or(-1))
                    .collect(),
                defaults: data
                    .defaults
                    .iter()
                    .zip(&data.operator.slots)
                    .map(|(v, spec)| encode(*v, spec.value_type))
                    .collect(),
                config: data.config.clone(),
                placement: data.placement,
            })
            .collect();
        GraphDocument { nodes }
    }

    /// Rebuilds a graph from records, resolving operators through `catalog`.
    ///
    /// Returns the graph and the handle of each record in order.
    pub fn from_document(
        document: &GraphDocument,
        catalog: &Catalog,
    ) -> Result<(Self, Vec<NodeId>), GraphError> {
        let mut graph = Graph::new();
        let count = document.nodes.len();

        for (index, record) in document.nodes.iter().enumerate() {
            let id = record.operator_id();
            let operator = catalog
                .lookup(id)
                .map_err(|_| GraphError::UnknownOperator(id))?;
            let arity = operator.arity();
            if record.inputs.len() > arity {
                return Err(GraphError::InvalidRecord {
                    index,
                    reason: format!("{} inputs for an operator with {arity} slots", record.inputs.len()),
                });
            }
            if record.defaults.len() > arity {
                return Err(GraphError::InvalidRecord {
                    index,
                    reason: format!("{} defaults for an operator with {arity} slots", record.defaults.len()),
                });
            }

            let mut data = NodeData::new(operator.clone());
            for (cell, (literal, spec)) in data
                .defaults
                .iter_mut()
                .zip(record.defaults.iter().zip(&operator.slots))
            {
                *cell = Value::from_literal(*literal, spec.value_type);
            }
            data.config = record.config.clone();
            data.placement = record.placement;
            graph.nodes.push(Some(data));
        }

        for (index, record) in document.nodes.iter().enumerate() {
            let consumer = NodeId(index as u32);
            for (slot, &source) in record.inputs.iter().enumerate() {
                if source < 0 {
                    continue;
                }
                let source = source as usize;
                if source >= count || source == index {
                    return Err(GraphError::InvalidRecord {
                        index,
                        reason: format!("slot {slot} reads record {source}"),
                    });
                }
                let producer = NodeId(source as u32);
                if let Some(c) = graph.node_mut(consumer) {
                    c.inputs[slot] = Some(producer);
                }
                if let Some(p) = graph.node_mut(producer) {
                    p.consumers.insert((consumer, slot));
                }
            }
        }
        graph.finish_load(count)?;

        let ids = (0..count).map(|i| NodeId(i as u32)).collect();
        Ok((graph, ids))
    }

    fn finish_load(&mut self, count: usize) -> Result<(), GraphError> {
        self.node_count = count;

        // Cycle check: Kahn over every node.
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| n.as_ref().map_or(0, |n| n.inputs.iter().flatten().count()))
            .collect();
        let mut ready: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = 0usize;
        while let Some(i) = ready.pop() {
            sorted += 1;
            let Some(node) = self.nodes[i].as_ref() else {
                continue;
            };
            for &(consumer, _) in &node.consumers {
                let c = consumer.slot();
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.push(c);
                }
            }
        }
        if sorted != count {
            let stuck = (0..count).find(|&i| in_degree[i] > 0).unwrap_or(0);
            let node = NodeId(stuck as u32);
            let producer = self
                .node(node)
                .and_then(|n| n.inputs.iter().flatten().copied().next())
                .unwrap_or(node);
            return Err(GraphError::CycleDetected { node, producer });
        }

        let edges = self.edges();
        for &(producer, node, slot) in &edges {
            let Some(data) = self.node(node) else { continue };
            let demands = data.operator.slots[slot].compile_time || self.needs_compile_time_inputs(node);
            let stands_in = self
                .operator(producer)
                .is_some_and(|op| op.is_graph_input());
            if demands && !stands_in && !self.is_compile_time_known(producer) {
                return Err(GraphError::CompileTimeRequired {
                    node,
                    slot,
                    producer,
                });
            }
        }

        self.resolve_types();

        for &(producer, node, slot) in &edges {
            let expected = self
                .node(node)
                .and_then(|n| n.operator.slots.get(slot))
                .map_or(0, |spec| spec.required_len);
            if expected == 0 {
                continue;
            }
            let found = self.probe_len(producer)?;
            if found != expected {
                return Err(GraphError::LengthMismatch {
                    node,
                    slot,
                    producer,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}
