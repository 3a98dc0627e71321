//! The olive/jack walkthrough.
//!
//! Assumes the store's model lets `owner` and `viewer` imply `can_read` on
//! `doc`, and that jack was provisioned as owner of `doc:secret1`.

use rootcause::prelude::Report;
use tuplegate_authz::{
    AuthzClient, AuthzError, CallContext, Consistency, Object, ObjectType, Relation, Subject,
};

/// What each step of the walkthrough observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Whether olive held `viewer` before the walkthrough removed it.
    pub olive_was_viewer: bool,
    /// Jack's `can_read` on the secret.
    pub jack_can_read: bool,
    /// Olive's `can_read` before the grant.
    pub olive_could_read: bool,
    /// Olive's `can_read` after the grant.
    pub olive_can_read: bool,
    /// Docs olive can read at the end, sorted for display.
    pub olive_docs: Vec<String>,
}

/// Runs the walkthrough against `client`.
///
/// A `TupleNotFound` from the initial revoke is expected on a fresh store
/// and is recorded rather than treated as a failure. Reads that must see
/// the walkthrough's own writes go out at `HigherConsistency`.
///
/// # Errors
///
/// Returns any other authorization error unchanged.
pub async fn run(
    client: &AuthzClient,
    call: &CallContext,
) -> Result<ScenarioReport, Report<AuthzError>> {
    let olive = Subject::user("olive")?;
    let jack = Subject::user("jack")?;
    let secret = Object::parse("doc:secret1")?;
    let viewer = Relation::new("viewer")?;
    let can_read = Relation::new("can_read")?;

    // remove Olive's access to the secret
    let olive_was_viewer = match client.revoke(&olive, &secret, &viewer, call).await {
        Ok(()) => true,
        Err(report) if matches!(report.current_context(), AuthzError::TupleNotFound { .. }) => {
            tracing::warn!(error = %report, "olive had no viewer relation to remove");
            false
        }
        Err(report) => return Err(report),
    };

    let fresh = call.clone().with_consistency(Consistency::HigherConsistency);

    let jack_can_read = client.check(&jack, &secret, &can_read, call).await?;
    println!("Can Jack read secret? {jack_can_read}");

    let olive_could_read = client.check(&olive, &secret, &can_read, &fresh).await?;
    println!("Can Olive read secret? {olive_could_read}");

    client.grant(&olive, &secret, &viewer, call).await?;

    let olive_can_read = client.check(&olive, &secret, &can_read, &fresh).await?;
    println!("Can Olive read secret? {olive_can_read}");

    let doc = ObjectType::new("doc")?;
    let mut olive_docs: Vec<String> = client
        .list_accessible(&olive, &doc, &can_read, &fresh)
        .await?
        .iter()
        .map(ToString::to_string)
        .collect();
    olive_docs.sort();
    println!("Docs Olive can read: {}", olive_docs.join(", "));

    Ok(ScenarioReport {
        olive_was_viewer,
        jack_can_read,
        olive_could_read,
        olive_can_read,
        olive_docs,
    })
}
