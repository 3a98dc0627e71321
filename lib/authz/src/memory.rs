//! In-process engine for tests and local development.
//!
//! Holds tuples in memory and derives relations from two rule shapes:
//! computed relations (`can_read` holds wherever `viewer` holds) and
//! userset subjects (`group:eng#member` as the subject of a tuple). It
//! counts every engine call so tests can assert that rejected input never
//! reached the engine.

use crate::call::RequestMeta;
use crate::engine::{RelationshipEngine, WriteBatch};
use crate::error::AuthzError;
use crate::types::{ListQuery, Object, ObjectType, Relation, RelationshipTuple, Subject};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Memory-backed relationship engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tuples: RwLock<BTreeSet<RelationshipTuple>>,
    /// (object type, relation) -> relations that imply it.
    rules: HashMap<(ObjectType, Relation), Vec<Relation>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryEngine {
    /// Creates an empty engine with no derivation rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `relation` on objects of `object_type` holds wherever
    /// any of `implied_by` holds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if any name is malformed.
    pub fn with_rule(
        mut self,
        object_type: &str,
        relation: &str,
        implied_by: &[&str],
    ) -> Result<Self, Report<AuthzError>> {
        let key = (ObjectType::new(object_type)?, Relation::new(relation)?);
        let sources = implied_by
            .iter()
            .map(|name| Relation::new(*name))
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.entry(key).or_default().extend(sources);
        Ok(self)
    }

    /// Delays every engine call, to exercise deadlines and cancellation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts tuples directly, bypassing the call counter.
    pub fn seed(&self, tuples: impl IntoIterator<Item = RelationshipTuple>) {
        let mut stored = self.tuples.write().unwrap_or_else(PoisonError::into_inner);
        stored.extend(tuples);
    }

    /// Number of engine calls served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of stored tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no tuples are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn holds(
        &self,
        tuples: &BTreeSet<RelationshipTuple>,
        subject: &Subject,
        relation: &Relation,
        object: &Object,
        visited: &mut HashSet<(Relation, Object)>,
    ) -> bool {
        if !visited.insert((relation.clone(), object.clone())) {
            return false;
        }

        let direct = RelationshipTuple::new(subject.clone(), relation.clone(), object.clone());
        if tuples.contains(&direct) {
            return true;
        }

        let via_userset = tuples
            .iter()
            .filter(|t| &t.relation == relation && &t.object == object)
            .filter_map(|t| t.subject.relation().map(|r| (t.subject.object(), r)))
            .any(|(group, member_relation)| {
                self.holds(tuples, subject, member_relation, group, visited)
            });
        if via_userset {
            return true;
        }

        let key = (object.object_type().clone(), relation.clone());
        self.rules.get(&key).is_some_and(|sources| {
            sources
                .iter()
                .any(|source| self.holds(tuples, subject, source, object, visited))
        })
    }
}

#[async_trait]
impl RelationshipEngine for MemoryEngine {
    async fn write(
        &self,
        batch: &WriteBatch,
        _meta: &RequestMeta,
    ) -> Result<(), Report<AuthzError>> {
        self.enter().await;
        let mut stored = self.tuples.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(missing) = batch.deletes.iter().find(|t| !stored.contains(*t)) {
            return Err(AuthzError::TupleNotFound {
                tuple: missing.to_string(),
            }
            .into());
        }

        for tuple in &batch.deletes {
            stored.remove(tuple);
        }
        stored.extend(batch.writes.iter().cloned());
        debug!(total = stored.len(), "memory engine applied write batch");
        Ok(())
    }

    async fn check(
        &self,
        tuple: &RelationshipTuple,
        _meta: &RequestMeta,
    ) -> Result<bool, Report<AuthzError>> {
        self.enter().await;
        let stored = self.tuples.read().unwrap_or_else(PoisonError::into_inner);
        let mut visited = HashSet::new();
        Ok(self.holds(
            &stored,
            &tuple.subject,
            &tuple.relation,
            &tuple.object,
            &mut visited,
        ))
    }

    async fn list_objects(
        &self,
        query: &ListQuery,
        _meta: &RequestMeta,
    ) -> Result<Vec<Object>, Report<AuthzError>> {
        self.enter().await;
        let stored = self.tuples.read().unwrap_or_else(PoisonError::into_inner);
        let candidates: BTreeSet<&Object> = stored
            .iter()
            .map(|t| &t.object)
            .filter(|o| o.object_type() == &query.object_type)
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|object| {
                let mut visited = HashSet::new();
                self.holds(
                    &stored,
                    &query.subject,
                    &query.relation,
                    object,
                    &mut visited,
                )
            })
            .cloned()
            .collect())
    }
}
