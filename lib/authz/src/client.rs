//! Authorization client: the typed boundary in front of the engine.

use crate::call::{CallContext, RequestMeta};
use crate::context::AuthorizationContext;
use crate::engine::{RelationshipEngine, WriteBatch};
use crate::error::{AuthzError, CancelReason};
use crate::openfga::OpenFgaEngine;
use crate::types::{ListQuery, Object, ObjectType, Relation, RelationshipTuple, Subject};
use rootcause::prelude::Report;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Authorization client.
///
/// Holds no mutable state and takes no locks, so one instance can be
/// cloned into every task that needs it. All calls are scoped to the
/// store and model version of its [`AuthorizationContext`].
///
/// # Consistency
///
/// The client does not cache and does not promise read-after-write. A
/// `check` or `list_accessible` issued after a successful `grant` or
/// `revoke` observes it only if the engine has already propagated it,
/// which at `Consistency::MinimizeLatency` can take up to the engine's
/// cache window. Callers that need the effect immediately must read with
/// `Consistency::HigherConsistency`.
#[derive(Clone)]
pub struct AuthzClient {
    context: Arc<AuthorizationContext>,
    engine: Arc<dyn RelationshipEngine>,
}

impl std::fmt::Debug for AuthzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzClient")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl AuthzClient {
    /// Connects to the OpenFGA server named by `context`.
    ///
    /// Fails fast: the configured model must exist in the configured
    /// store before a client is handed out.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the engine cannot be reached or does not
    /// know the store or model.
    pub async fn connect(context: AuthorizationContext) -> Result<Self, Report<AuthzError>> {
        let engine = OpenFgaEngine::new(&context)?;
        let meta = RequestMeta {
            deadline: context.request_timeout().map(|t| Instant::now() + t),
            consistency: context.consistency(),
        };
        engine.verify_model(&meta).await?;

        debug!(
            endpoint = %context.endpoint(),
            store_id = %context.store_id(),
            model_id = %context.model_id(),
            "authorization client connected"
        );
        Ok(Self::with_engine(context, Arc::new(engine)))
    }

    /// Creates a client over an already constructed engine.
    #[must_use]
    pub fn with_engine(context: AuthorizationContext, engine: Arc<dyn RelationshipEngine>) -> Self {
        Self {
            context: Arc::new(context),
            engine,
        }
    }

    /// Returns the context every call is scoped to.
    #[must_use]
    pub fn context(&self) -> &AuthorizationContext {
        &self.context
    }

    fn meta(&self, call: &CallContext) -> RequestMeta {
        let deadline = call.deadline().or_else(|| {
            self.context
                .request_timeout()
                .map(|timeout| Instant::now() + timeout)
        });
        RequestMeta {
            deadline,
            consistency: call.consistency().unwrap_or(self.context.consistency()),
        }
    }

    /// Grants `relation` on `object` to `subject`.
    ///
    /// Granting a tuple that already exists succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFault`, `TransportFault`, or `Cancelled`.
    #[instrument(skip_all, fields(subject = %subject, relation = %relation, object = %object))]
    pub async fn grant(
        &self,
        subject: &Subject,
        object: &Object,
        relation: &Relation,
        call: &CallContext,
    ) -> Result<(), Report<AuthzError>> {
        let tuple = RelationshipTuple::new(subject.clone(), relation.clone(), object.clone());
        let batch = WriteBatch::write(tuple);
        let meta = self.meta(call);
        bounded(&meta, call, self.engine.write(&batch, &meta)).await?;

        debug!("user access created");
        Ok(())
    }

    /// Revokes `relation` on `object` from `subject`.
    ///
    /// Not idempotent: revoking a tuple that does not exist fails with
    /// `TupleNotFound`, and deciding whether that matters is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns `TupleNotFound`, `RemoteFault`, `TransportFault`, or
    /// `Cancelled`.
    #[instrument(skip_all, fields(subject = %subject, relation = %relation, object = %object))]
    pub async fn revoke(
        &self,
        subject: &Subject,
        object: &Object,
        relation: &Relation,
        call: &CallContext,
    ) -> Result<(), Report<AuthzError>> {
        let tuple = RelationshipTuple::new(subject.clone(), relation.clone(), object.clone());
        let batch = WriteBatch::delete(tuple);
        let meta = self.meta(call);
        bounded(&meta, call, self.engine.write(&batch, &meta)).await?;

        debug!("user access deleted");
        Ok(())
    }

    /// Checks whether `subject` holds `relation` on `object`, directly or
    /// through any rule of the authorization model.
    ///
    /// A denial is `Ok(false)`; only failed queries are errors.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFault`, `TransportFault`, or `Cancelled`.
    #[instrument(skip_all, fields(subject = %subject, relation = %relation, object = %object))]
    pub async fn check(
        &self,
        subject: &Subject,
        object: &Object,
        relation: &Relation,
        call: &CallContext,
    ) -> Result<bool, Report<AuthzError>> {
        let tuple = RelationshipTuple::new(subject.clone(), relation.clone(), object.clone());
        let meta = self.meta(call);
        let allowed = bounded(&meta, call, self.engine.check(&tuple, &meta)).await?;

        debug!(allowed, consistency = %meta.consistency, "permission check result");
        Ok(allowed)
    }

    /// Checks a relation and turns a denial into `PermissionDenied`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the check evaluates to false, or
    /// any error `check` can return.
    pub async fn require(
        &self,
        subject: &Subject,
        object: &Object,
        relation: &Relation,
        call: &CallContext,
    ) -> Result<(), Report<AuthzError>> {
        if !self.check(subject, object, relation, call).await? {
            return Err(AuthzError::PermissionDenied {
                subject: subject.to_string(),
                relation: relation.to_string(),
                object: object.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Lists every object of `object_type` that `subject` reaches through
    /// `relation`.
    ///
    /// The result is a set with no ordering and no stability across calls.
    /// The engine bounds it by its own result cap and deadline; when the
    /// count reaches the configured cap a warning is logged, since the
    /// engine may have cut the list short without saying so.
    ///
    /// # Errors
    ///
    /// Returns `RemoteFault`, `TransportFault`, or `Cancelled`.
    #[instrument(skip_all, fields(subject = %subject, relation = %relation, object_type = %object_type))]
    pub async fn list_accessible(
        &self,
        subject: &Subject,
        object_type: &ObjectType,
        relation: &Relation,
        call: &CallContext,
    ) -> Result<HashSet<Object>, Report<AuthzError>> {
        let query = ListQuery::new(subject.clone(), object_type.clone(), relation.clone());
        let meta = self.meta(call);
        let objects = bounded(&meta, call, self.engine.list_objects(&query, &meta)).await?;

        let objects: HashSet<Object> = objects
            .into_iter()
            .filter(|object| object.object_type() == object_type)
            .collect();
        if let Some(cap) = self.context.list_objects_max_results() {
            if objects.len() >= cap {
                warn!(
                    count = objects.len(),
                    cap, "list result reached the engine's cap and may be truncated"
                );
            }
        }

        debug!(count = objects.len(), "user access listed");
        Ok(objects)
    }
}

/// Runs an engine call under the call's deadline and cancellation token.
///
/// Cancellation is polled first, so an already cancelled call never
/// reaches the engine. Neither does a call whose deadline has passed:
/// `timeout_at` would poll the operation once before noticing.
async fn bounded<T, F>(
    meta: &RequestMeta,
    call: &CallContext,
    operation: F,
) -> Result<T, Report<AuthzError>>
where
    F: Future<Output = Result<T, Report<AuthzError>>>,
{
    if call.cancellation().is_some_and(CancellationToken::is_cancelled) {
        return Err(AuthzError::Cancelled {
            reason: CancelReason::Cancelled,
        }
        .into());
    }
    if meta.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
        return Err(AuthzError::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        }
        .into());
    }

    let timed = async {
        match meta.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, operation).await {
                Ok(result) => result,
                Err(_) => Err(AuthzError::Cancelled {
                    reason: CancelReason::DeadlineExceeded,
                }
                .into()),
            },
            None => operation.await,
        }
    };

    match call.cancellation() {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(AuthzError::Cancelled {
                    reason: CancelReason::Cancelled,
                }
                .into()),
                result = timed => result,
            }
        }
        None => timed.await,
    }
}
