//! Patch validation against an operator catalog.
//!
//! [`validate_patch`] walks every record and reports all problems at once,
//! so a broken file can be fixed in one pass. Structural rules that need the
//! live graph (cycles, compile-time slots) are left to
//! [`Graph::from_document`](waviate_core::Graph::from_document).

use thiserror::Error;
use waviate_core::{Catalog, GraphDocument, OperatorId};

use crate::patch::Patch;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A record names an operator the catalog does not know.
    #[error("record {index}: unknown operator {operator}")]
    UnknownOperator {
        /// Record position.
        index: usize,
        /// The missing operator.
        operator: OperatorId,
    },

    /// A record lists more inputs than its operator has slots.
    #[error("record {index}: {found} inputs for an operator with {arity} slots")]
    TooManyInputs {
        /// Record position.
        index: usize,
        /// Inputs listed.
        found: usize,
        /// Slots declared.
        arity: usize,
    },

    /// An input index points past the end of the record list.
    #[error("record {index} slot {slot}: input {target} out of range (0..{len})")]
    InputOutOfRange {
        /// Record position.
        index: usize,
        /// Consumer slot.
        slot: usize,
        /// The bad index.
        target: i64,
        /// Number of records.
        len: usize,
    },

    /// A record feeds itself.
    #[error("record {index} slot {slot}: reads its own output")]
    SelfReference {
        /// Record position.
        index: usize,
        /// Consumer slot.
        slot: usize,
    },

    /// The patch output names no record.
    #[error("output {output} out of range (0..{len})")]
    OutputOutOfRange {
        /// The bad index.
        output: usize,
        /// Number of records.
        len: usize,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects every record-level problem in `document`.
pub fn document_errors(document: &GraphDocument, catalog: &Catalog) -> Vec<ValidationError> {
    let len = document.nodes.len();
    let mut errors = Vec::new();

    for (index, record) in document.nodes.iter().enumerate() {
        match catalog.lookup(record.operator_id()) {
            Ok(op) if record.inputs.len() > op.arity() => {
                errors.push(ValidationError::TooManyInputs {
                    index,
                    found: record.inputs.len(),
                    arity: op.arity(),
                });
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::UnknownOperator {
                index,
                operator: record.operator_id(),
            }),
        }

        for (slot, &target) in record.inputs.iter().enumerate() {
            if target == index as i64 {
                errors.push(ValidationError::SelfReference { index, slot });
            } else if target < -1 || target >= len as i64 {
                errors.push(ValidationError::InputOutOfRange {
                    index,
                    slot,
                    target,
                    len,
                });
            }
        }
    }
    errors
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Validates a bare graph document.
pub fn validate_document(document: &GraphDocument, catalog: &Catalog) -> ValidationResult<()> {
    collapse(document_errors(document, catalog))
}

/// Validates a patch: every record, plus the output index.
pub fn validate_patch(patch: &Patch, catalog: &Catalog) -> ValidationResult<()> {
    let mut errors = document_errors(&patch.graph, catalog);
    let len = patch.graph.nodes.len();
    if patch.output >= len {
        errors.push(ValidationError::OutputOutOfRange {
            output: patch.output,
            len,
        });
    }
    collapse(errors)
}
