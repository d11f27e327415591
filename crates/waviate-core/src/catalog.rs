//! Append-only registry of operator descriptors.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::CatalogError;
use crate::operator::{OperatorId, OperatorType};

/// Operators known to an engine instance, keyed by [`OperatorId`].
///
/// Entries are never replaced or removed. Persistence code resolves saved
/// graphs through [`lookup`](Self::lookup).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<OperatorId, Arc<OperatorType>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operator and returns the shared descriptor.
    pub fn register(&mut self, operator: OperatorType) -> Result<Arc<OperatorType>, CatalogError> {
        self.register_shared(Arc::new(operator))
    }

    /// Registers an already shared descriptor (e.g. a promoted sub-graph).
    pub fn register_shared(
        &mut self,
        operator: Arc<OperatorType>,
    ) -> Result<Arc<OperatorType>, CatalogError> {
        let id = operator.id;
        if self.entries.contains_key(&id) {
            return Err(CatalogError::Duplicate(id));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("catalog_register: {id} {}", operator.name);
        self.entries.insert(id, Arc::clone(&operator));
        Ok(operator)
    }

    /// Looks up an operator by id.
    pub fn lookup(&self, id: OperatorId) -> Result<&Arc<OperatorType>, CatalogError> {
        self.entries.get(&id).ok_or(CatalogError::Unknown(id))
    }

    /// Finds the first operator with the given display name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<OperatorType>> {
        self.entries.values().find(|op| op.name == name)
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: OperatorId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterates operators in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<OperatorType>> {
        self.entries.values()
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
