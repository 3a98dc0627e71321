//! The remote engine seam.
//!
//! An engine is a handle already scoped to one store and one model
//! version. Implementations translate their own faults into
//! [`AuthzError`] at this boundary; nothing above it sees a raw transport
//! or protocol error.

use crate::call::RequestMeta;
use crate::error::AuthzError;
use crate::types::{ListQuery, Object, RelationshipTuple};
use async_trait::async_trait;
use rootcause::prelude::Report;

/// One atomic write against the relationship store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Tuples to create.
    pub writes: Vec<RelationshipTuple>,
    /// Tuples to delete.
    pub deletes: Vec<RelationshipTuple>,
}

impl WriteBatch {
    /// A batch creating exactly one tuple.
    #[must_use]
    pub fn write(tuple: RelationshipTuple) -> Self {
        Self {
            writes: vec![tuple],
            deletes: Vec::new(),
        }
    }

    /// A batch deleting exactly one tuple.
    #[must_use]
    pub fn delete(tuple: RelationshipTuple) -> Self {
        Self {
            writes: Vec::new(),
            deletes: vec![tuple],
        }
    }

    /// Returns true if the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    /// Returns the only tuple of a single-tuple batch.
    pub(crate) fn single(&self) -> Option<&RelationshipTuple> {
        match (self.writes.as_slice(), self.deletes.as_slice()) {
            ([tuple], []) | ([], [tuple]) => Some(tuple),
            _ => None,
        }
    }
}

/// Operations consumed from the authorization engine.
///
/// Implementations must uphold these outcomes for single-tuple batches:
/// creating a tuple that already exists succeeds, and deleting a tuple
/// that does not exist fails with `TupleNotFound`.
#[async_trait]
pub trait RelationshipEngine: Send + Sync {
    /// Applies a batch of creations and deletions atomically.
    async fn write(&self, batch: &WriteBatch, meta: &RequestMeta)
    -> Result<(), Report<AuthzError>>;

    /// Evaluates whether the tuple's relation holds, directly or derived.
    async fn check(
        &self,
        tuple: &RelationshipTuple,
        meta: &RequestMeta,
    ) -> Result<bool, Report<AuthzError>>;

    /// Returns the objects of the query's type reachable by the subject.
    async fn list_objects(
        &self,
        query: &ListQuery,
        meta: &RequestMeta,
    ) -> Result<Vec<Object>, Report<AuthzError>>;
}
