//! Authorization client for a relationship-based (ReBAC) engine.
//!
//! Permissions are stored as relationship tuples, "subject has relation R
//! to object O", in a remote engine that owns the authorization model and
//! all policy evaluation. This crate is the typed boundary in front of it:
//! identifiers are validated before anything is sent, every remote fault is
//! classified into [`AuthzError`], and every call honours a deadline and a
//! cancellation token.
//!
//! ```no_run
//! # async fn demo() -> Result<(), rootcause::prelude::Report<tuplegate_authz::AuthzError>> {
//! use tuplegate_authz::{AuthorizationContext, AuthzClient, CallContext, Object, Relation, Subject};
//!
//! let context = AuthorizationContext::new(
//!     "http://localhost:8080",
//!     "01JEQZ1TBAEXFDHKPZSZ3GNZG6",
//!     "01JEQZ8CG0XYAN76DXZMM3RXTZ",
//! )?;
//! let client = AuthzClient::connect(context).await?;
//! let allowed = client
//!     .check(
//!         &Subject::user("jack")?,
//!         &Object::parse("doc:secret1")?,
//!         &Relation::new("can_read")?,
//!         &CallContext::new(),
//!     )
//!     .await?;
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```

mod call;
mod client;
mod context;
mod engine;
mod error;
pub mod memory;
mod openfga;
mod types;
pub mod validate;

pub use call::{CallContext, RequestMeta};
pub use client::AuthzClient;
pub use context::{AuthorizationContext, AuthzConfig, Consistency};
pub use engine::{RelationshipEngine, WriteBatch};
pub use error::{AuthzError, CancelReason};
pub use memory::MemoryEngine;
pub use openfga::OpenFgaEngine;
pub use types::{ListQuery, Object, ObjectType, Relation, RelationshipTuple, Subject};
