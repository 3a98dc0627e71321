//! OpenFGA engine over its HTTP API.
//!
//! Every request is scoped to the store and model version fixed in the
//! [`AuthorizationContext`]. Engine replies are classified into
//! [`AuthzError`] here and nowhere else.

use crate::call::RequestMeta;
use crate::context::AuthorizationContext;
use crate::engine::{RelationshipEngine, WriteBatch};
use crate::error::{AuthzError, CancelReason, source_chain};
use crate::types::{ListQuery, Object, RelationshipTuple};
use async_trait::async_trait;
use reqwest::StatusCode;
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Code OpenFGA returns when a write hits an existing tuple or a delete
/// misses one.
const WRITE_INVALID_INPUT: &str = "write_failed_due_to_invalid_input";

#[derive(Debug, Serialize)]
struct TupleKey {
    user: String,
    relation: String,
    object: String,
}

impl From<&RelationshipTuple> for TupleKey {
    fn from(tuple: &RelationshipTuple) -> Self {
        Self {
            user: tuple.subject.to_string(),
            relation: tuple.relation.to_string(),
            object: tuple.object.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TupleKeys {
    tuple_keys: Vec<TupleKey>,
}

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    authorization_model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys>,
}

#[derive(Debug, Serialize)]
struct CheckBody<'a> {
    authorization_model_id: &'a str,
    tuple_key: TupleKey,
    consistency: &'static str,
}

#[derive(Debug, Deserialize)]
struct CheckReply {
    allowed: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ListObjectsBody<'a> {
    authorization_model_id: &'a str,
    #[serde(rename = "type")]
    object_type: &'a str,
    relation: &'a str,
    user: String,
    consistency: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListObjectsReply {
    #[serde(default)]
    objects: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FaultBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Handle to an OpenFGA server, scoped to one store and model.
#[derive(Debug, Clone)]
pub struct OpenFgaEngine {
    http: reqwest::Client,
    stores_url: String,
    store_id: String,
    model_id: String,
    api_token: Option<String>,
}

impl OpenFgaEngine {
    /// Creates an engine handle without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(context: &AuthorizationContext) -> Result<Self, Report<AuthzError>> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthzError::Configuration {
                details: format!("failed to build HTTP client: {}", source_chain(&e)),
            })?;

        Ok(Self {
            http,
            stores_url: format!(
                "{}/stores",
                context.endpoint().as_str().trim_end_matches('/')
            ),
            store_id: context.store_id().to_string(),
            model_id: context.model_id().to_string(),
            api_token: context.api_token().map(str::to_string),
        })
    }

    /// Confirms the configured model exists in the configured store.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for any failure, including an unreachable
    /// server.
    #[instrument(skip(self, meta), fields(store_id = %self.store_id, model_id = %self.model_id))]
    pub async fn verify_model(&self, meta: &RequestMeta) -> Result<(), Report<AuthzError>> {
        let url = format!(
            "{}/{}/authorization-models/{}",
            self.stores_url, self.store_id, self.model_id
        );
        let request = self.authorize(self.http.get(&url), meta);
        let response = request
            .send()
            .await
            .map_err(|e| AuthzError::Configuration {
                details: format!("authorization engine unreachable: {}", source_chain(&e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let fault = read_fault(response).await;
            return Err(AuthzError::Configuration {
                details: format!(
                    "authorization model {} not available in store {} (status {}): {}",
                    self.model_id,
                    self.store_id,
                    status.as_u16(),
                    fault.message
                ),
            }
            .into());
        }

        debug!("authorization model verified");
        Ok(())
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.stores_url, self.store_id, operation)
    }

    fn authorize(
        &self,
        mut request: reqwest::RequestBuilder,
        meta: &RequestMeta,
    ) -> reqwest::RequestBuilder {
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(remaining) = meta.remaining() {
            request = request.timeout(remaining);
        }
        request
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        body: &B,
        meta: &RequestMeta,
    ) -> Result<reqwest::Response, Report<AuthzError>> {
        let request = self.authorize(self.http.post(self.url(operation)).json(body), meta);
        request.send().await.map_err(|e| transport_fault(&e).into())
    }
}

#[async_trait]
impl RelationshipEngine for OpenFgaEngine {
    async fn write(
        &self,
        batch: &WriteBatch,
        meta: &RequestMeta,
    ) -> Result<(), Report<AuthzError>> {
        let keys = |tuples: &[RelationshipTuple]| {
            (!tuples.is_empty()).then(|| TupleKeys {
                tuple_keys: tuples.iter().map(TupleKey::from).collect(),
            })
        };
        let body = WriteBody {
            authorization_model_id: &self.model_id,
            writes: keys(&batch.writes),
            deletes: keys(&batch.deletes),
        };

        debug!(
            writes = batch.writes.len(),
            deletes = batch.deletes.len(),
            "sending FGA write request"
        );
        let response = self.post("write", &body, meta).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let fault = read_fault(response).await;
        classify_write_fault(batch, status, fault)
    }

    async fn check(
        &self,
        tuple: &RelationshipTuple,
        meta: &RequestMeta,
    ) -> Result<bool, Report<AuthzError>> {
        let body = CheckBody {
            authorization_model_id: &self.model_id,
            tuple_key: TupleKey::from(tuple),
            consistency: meta.consistency.as_str(),
        };

        debug!(consistency = %meta.consistency, "sending FGA check request");
        let response = self.post("check", &body, meta).await?;
        let reply: CheckReply = decode(response).await?;
        reply.allowed.ok_or_else(|| {
            AuthzError::TransportFault {
                details: "check reply has no 'allowed' field".to_string(),
            }
            .into()
        })
    }

    async fn list_objects(
        &self,
        query: &ListQuery,
        meta: &RequestMeta,
    ) -> Result<Vec<Object>, Report<AuthzError>> {
        let body = ListObjectsBody {
            authorization_model_id: &self.model_id,
            object_type: query.object_type.as_str(),
            relation: query.relation.as_str(),
            user: query.subject.to_string(),
            consistency: meta.consistency.as_str(),
        };

        debug!(consistency = %meta.consistency, "sending FGA list objects request");
        let response = self.post("list-objects", &body, meta).await?;
        let reply: ListObjectsReply = decode(response).await?;
        reply
            .objects
            .iter()
            .map(|raw| -> Result<Object, Report<AuthzError>> {
                Object::parse(raw).map_err(|_| {
                    AuthzError::TransportFault {
                        details: format!("engine returned malformed object id '{raw}'"),
                    }
                    .into()
                })
            })
            .collect()
    }
}

fn transport_fault(err: &reqwest::Error) -> AuthzError {
    if err.is_timeout() {
        AuthzError::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        }
    } else {
        AuthzError::TransportFault {
            details: source_chain(err),
        }
    }
}

async fn read_fault(response: reqwest::Response) -> FaultBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| FaultBody {
        code: String::new(),
        message: text,
    })
}

fn remote_fault(status: StatusCode, fault: FaultBody) -> AuthzError {
    AuthzError::RemoteFault {
        code: fault.code,
        status: status.as_u16(),
        details: fault.message,
    }
}

/// Single-tuple batches are unambiguous: the invalid-input code can only
/// mean the one write already existed or the one delete missed.
fn classify_write_fault(
    batch: &WriteBatch,
    status: StatusCode,
    fault: FaultBody,
) -> Result<(), Report<AuthzError>> {
    if fault.code == WRITE_INVALID_INPUT {
        if let Some(tuple) = batch.single() {
            if batch.deletes.is_empty() {
                debug!("tuple already present, write treated as success");
                return Ok(());
            }
            return Err(AuthzError::TupleNotFound {
                tuple: tuple.to_string(),
            }
            .into());
        }
    }
    Err(remote_fault(status, fault).into())
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Report<AuthzError>> {
    let status = response.status();
    if !status.is_success() {
        let fault = read_fault(response).await;
        return Err(remote_fault(status, fault).into());
    }
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            transport_fault(&e).into()
        } else {
            AuthzError::TransportFault {
                details: format!("could not decode engine reply: {}", source_chain(&e)),
            }
            .into()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Consistency;
    use crate::types::{ObjectType, Relation, Subject};
    use std::time::Duration;
    use tokio::time::Instant;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STORE: &str = "01JEQZ1TBAEXFDHKPZSZ3GNZG6";
    const MODEL: &str = "01JEQZ8CG0XYAN76DXZMM3RXTZ";

    fn engine_for(uri: &str) -> OpenFgaEngine {
        let context = AuthorizationContext::new(uri, STORE, MODEL).expect("valid context");
        OpenFgaEngine::new(&context).expect("engine")
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            deadline: None,
            consistency: Consistency::MinimizeLatency,
        }
    }

    fn olive_viewer() -> RelationshipTuple {
        RelationshipTuple::parse("user:olive", "viewer", "doc:secret1").expect("valid")
    }

    fn kind(err: &Report<AuthzError>) -> &AuthzError {
        err.current_context()
    }

    fn fault_json(code: &str, message: &str) -> serde_json::Value {
        serde_json::json!({ "code": code, "message": message })
    }

    #[tokio::test]
    async fn check_sends_scoped_tuple_and_reads_decision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .and(body_json(serde_json::json!({
                "authorization_model_id": MODEL,
                "tuple_key": {
                    "user": "user:olive",
                    "relation": "viewer",
                    "object": "doc:secret1"
                },
                "consistency": "MINIMIZE_LATENCY"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "allowed": true, "resolution": "" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let allowed = engine_for(&server.uri())
            .check(&olive_viewer(), &meta())
            .await
            .expect("check");
        assert!(allowed);
    }

    #[tokio::test]
    async fn check_denial_is_ok_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "allowed": false })),
            )
            .mount(&server)
            .await;

        let allowed = engine_for(&server.uri())
            .check(&olive_viewer(), &meta())
            .await
            .expect("check");
        assert!(!allowed);
    }

    #[tokio::test]
    async fn check_reply_without_decision_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = engine_for(&server.uri())
            .check(&olive_viewer(), &meta())
            .await
            .unwrap_err();
        assert!(matches!(kind(&err), AuthzError::TransportFault { .. }));
    }

    #[tokio::test]
    async fn check_passes_requested_consistency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "consistency": "HIGHER_CONSISTENCY"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "allowed": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let meta = RequestMeta {
            deadline: None,
            consistency: Consistency::HigherConsistency,
        };
        let allowed = engine_for(&server.uri())
            .check(&olive_viewer(), &meta)
            .await
            .expect("check");
        assert!(allowed);
    }

    #[tokio::test]
    async fn write_sends_only_writes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/write")))
            .and(body_json(serde_json::json!({
                "authorization_model_id": MODEL,
                "writes": {
                    "tuple_keys": [{
                        "user": "user:olive",
                        "relation": "viewer",
                        "object": "doc:secret1"
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        engine_for(&server.uri())
            .write(&WriteBatch::write(olive_viewer()), &meta())
            .await
            .expect("write");
    }

    #[tokio::test]
    async fn duplicate_write_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/write")))
            .respond_with(ResponseTemplate::new(400).set_body_json(fault_json(
                WRITE_INVALID_INPUT,
                "cannot write a tuple which already exists",
            )))
            .mount(&server)
            .await;

        engine_for(&server.uri())
            .write(&WriteBatch::write(olive_viewer()), &meta())
            .await
            .expect("duplicate write is idempotent");
    }

    #[tokio::test]
    async fn deleting_missing_tuple_is_tuple_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/write")))
            .and(body_json(serde_json::json!({
                "authorization_model_id": MODEL,
                "deletes": {
                    "tuple_keys": [{
                        "user": "user:olive",
                        "relation": "viewer",
                        "object": "doc:secret1"
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(400).set_body_json(fault_json(
                WRITE_INVALID_INPUT,
                "cannot delete a tuple which does not exist",
            )))
            .mount(&server)
            .await;

        let err = engine_for(&server.uri())
            .write(&WriteBatch::delete(olive_viewer()), &meta())
            .await
            .unwrap_err();
        assert_eq!(
            kind(&err),
            &AuthzError::TupleNotFound {
                tuple: "doc:secret1#viewer@user:olive".to_string()
            }
        );
    }

    #[tokio::test]
    async fn mixed_batch_invalid_input_stays_remote_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/write")))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(fault_json(WRITE_INVALID_INPUT, "nope")),
            )
            .mount(&server)
            .await;

        let batch = WriteBatch {
            writes: vec![olive_viewer()],
            deletes: vec![
                RelationshipTuple::parse("user:jack", "viewer", "doc:secret1").expect("valid"),
            ],
        };
        let err = engine_for(&server.uri())
            .write(&batch, &meta())
            .await
            .unwrap_err();
        assert!(matches!(
            kind(&err),
            AuthzError::RemoteFault { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn unknown_relation_is_remote_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .respond_with(ResponseTemplate::new(400).set_body_json(fault_json(
                "relation_not_found",
                "relation 'doc#can_fly' not found",
            )))
            .mount(&server)
            .await;

        let tuple =
            RelationshipTuple::parse("user:olive", "can_fly", "doc:secret1").expect("valid");
        let err = engine_for(&server.uri())
            .check(&tuple, &meta())
            .await
            .unwrap_err();
        match kind(&err) {
            AuthzError::RemoteFault { code, status, .. } => {
                assert_eq!(code, "relation_not_found");
                assert_eq!(*status, 400);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!kind(&err).is_retryable());
    }

    #[tokio::test]
    async fn server_error_without_json_body_is_retryable_remote_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = engine_for(&server.uri())
            .check(&olive_viewer(), &meta())
            .await
            .unwrap_err();
        match kind(&err) {
            AuthzError::RemoteFault { details, status, .. } => {
                assert_eq!(details, "upstream unavailable");
                assert_eq!(*status, 503);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(kind(&err).is_retryable());
    }

    #[tokio::test]
    async fn unreachable_engine_is_transport_fault() {
        let err = engine_for("http://127.0.0.1:1")
            .check(&olive_viewer(), &meta())
            .await
            .unwrap_err();
        assert!(matches!(kind(&err), AuthzError::TransportFault { .. }));
    }

    #[tokio::test]
    async fn slow_engine_past_deadline_is_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "allowed": true }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let meta = RequestMeta {
            deadline: Some(Instant::now() + Duration::from_millis(50)),
            consistency: Consistency::MinimizeLatency,
        };
        let err = engine_for(&server.uri())
            .check(&olive_viewer(), &meta)
            .await
            .unwrap_err();
        assert_eq!(
            kind(&err),
            &AuthzError::Cancelled {
                reason: CancelReason::DeadlineExceeded
            }
        );
    }

    #[tokio::test]
    async fn list_objects_parses_typed_objects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/list-objects")))
            .and(body_json(serde_json::json!({
                "authorization_model_id": MODEL,
                "type": "doc",
                "relation": "can_read",
                "user": "user:olive",
                "consistency": "MINIMIZE_LATENCY"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "objects": ["doc:secret1", "doc:roadmap"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ListQuery::new(
            Subject::user("olive").expect("valid"),
            ObjectType::new("doc").expect("valid"),
            Relation::new("can_read").expect("valid"),
        );
        let objects = engine_for(&server.uri())
            .list_objects(&query, &meta())
            .await
            .expect("list");
        let ids: Vec<&str> = objects.iter().map(Object::id).collect();
        assert_eq!(ids, vec!["secret1", "roadmap"]);
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/stores/{STORE}/check")))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "allowed": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let context = AuthorizationContext::new(&server.uri(), STORE, MODEL)
            .expect("valid context")
            .with_api_token("s3cret");
        let engine = OpenFgaEngine::new(&context).expect("engine");
        assert!(engine.check(&olive_viewer(), &meta()).await.expect("check"));
    }

    #[tokio::test]
    async fn verify_model_accepts_existing_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/stores/{STORE}/authorization-models/{MODEL}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "authorization_model": { "id": MODEL, "schema_version": "1.1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        engine_for(&server.uri())
            .verify_model(&meta())
            .await
            .expect("model exists");
    }

    #[tokio::test]
    async fn verify_model_missing_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/stores/{STORE}/authorization-models/{MODEL}")))
            .respond_with(ResponseTemplate::new(404).set_body_json(fault_json(
                "authorization_model_not_found",
                "the authorization model does not exist",
            )))
            .mount(&server)
            .await;

        let err = engine_for(&server.uri())
            .verify_model(&meta())
            .await
            .unwrap_err();
        assert!(matches!(kind(&err), AuthzError::Configuration { .. }));
    }
}
