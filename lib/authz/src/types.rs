//! Authorization types for relationship tuples.
//!
//! Identifiers are tagged values (`kind` + `id`) rather than preformatted
//! strings. Their `Display` impls are the only place the wire-level
//! `type:id` form is produced.

use crate::error::AuthzError;
use crate::validate;
use rootcause::prelude::Report;
use std::fmt;
use std::str::FromStr;

/// An object type defined by the authorization model (e.g. `doc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectType(String);

impl ObjectType {
    /// Creates a validated object type.
    pub fn new(name: impl Into<String>) -> Result<Self, Report<AuthzError>> {
        let name = name.into();
        validate::type_name("object type", &name)?;
        Ok(Self(name))
    }

    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectType {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A relation or permission name (e.g. `viewer`, `can_read`).
///
/// Whether the name exists in the model is checked by the engine only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Relation(String);

impl Relation {
    /// Creates a validated relation name.
    pub fn new(name: impl Into<String>) -> Result<Self, Report<AuthzError>> {
        let name = name.into();
        validate::relation_name("relation", &name)?;
        Ok(Self(name))
    }

    /// Returns the relation name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Relation {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// An object in the relationship graph, e.g. `doc:secret1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Object {
    object_type: ObjectType,
    id: String,
}

impl Object {
    /// Creates an object from its type and id.
    pub fn new(
        object_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<Self, Report<AuthzError>> {
        let object_type = ObjectType::new(object_type)?;
        Self::of_type(object_type, id)
    }

    /// Creates an object of an already validated type.
    pub fn of_type(
        object_type: ObjectType,
        id: impl Into<String>,
    ) -> Result<Self, Report<AuthzError>> {
        let id = id.into();
        validate::object_id("object", &id)?;
        Ok(Self { object_type, id })
    }

    /// Parses the wire form `type:id`.
    pub fn parse(value: &str) -> Result<Self, Report<AuthzError>> {
        let (object_type, id) = validate::split_namespaced("object", value)?;
        Self::new(object_type, id)
    }

    /// Returns the object type.
    #[must_use]
    pub fn object_type(&self) -> &ObjectType {
        &self.object_type
    }

    /// Returns the object id, without the type tag.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}

impl FromStr for Object {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A subject (actor) in the authorization model.
///
/// Either a concrete object such as `user:olive`, or a userset such as
/// `group:eng#member` meaning "every member of group eng".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject {
    object: Object,
    relation: Option<Relation>,
}

impl Subject {
    /// Creates a concrete subject from its type and id.
    pub fn new(
        subject_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<Self, Report<AuthzError>> {
        let (subject_type, id) = (subject_type.into(), id.into());
        validate::type_name("subject", &subject_type)?;
        validate::object_id("subject", &id)?;
        Ok(Self::from_object(Object::new(subject_type, id)?))
    }

    /// Creates a `user` subject.
    pub fn user(id: impl Into<String>) -> Result<Self, Report<AuthzError>> {
        Self::new("user", id)
    }

    /// Uses an existing object as a subject.
    #[must_use]
    pub fn from_object(object: Object) -> Self {
        Self {
            object,
            relation: None,
        }
    }

    /// Creates a userset subject: everyone holding `relation` on `object`.
    #[must_use]
    pub fn userset(object: Object, relation: Relation) -> Self {
        Self {
            object,
            relation: Some(relation),
        }
    }

    /// Parses the wire form `type:id` or `type:id#relation`.
    pub fn parse(value: &str) -> Result<Self, Report<AuthzError>> {
        let (object_part, relation) = match value.split_once('#') {
            Some((object_part, relation)) => (object_part, Some(relation)),
            None => (value, None),
        };
        let (subject_type, id) = validate::split_namespaced("subject", object_part)?;
        validate::type_name("subject", subject_type)?;
        validate::object_id("subject", id)?;
        let object = Object::new(subject_type, id)?;
        match relation {
            Some(relation) => {
                validate::relation_name("subject", relation)?;
                Ok(Self::userset(object, Relation::new(relation)?))
            }
            None => Ok(Self::from_object(object)),
        }
    }

    /// Returns the subject's object part.
    #[must_use]
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Returns the userset relation, if this subject is a userset.
    #[must_use]
    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}#{}", self.object, relation),
            None => write!(f, "{}", self.object),
        }
    }
}

impl FromStr for Subject {
    type Err = Report<AuthzError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A relationship tuple: `subject` has `relation` to `object`.
///
/// Uniquely identified by the triple. Also used as the point query of a
/// check, where it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipTuple {
    /// The subject.
    pub subject: Subject,
    /// The relation name.
    pub relation: Relation,
    /// The object.
    pub object: Object,
}

impl RelationshipTuple {
    /// Creates a new tuple.
    #[must_use]
    pub fn new(subject: Subject, relation: Relation, object: Object) -> Self {
        Self {
            subject,
            relation,
            object,
        }
    }

    /// Parses a tuple from its three wire-form parts.
    pub fn parse(subject: &str, relation: &str, object: &str) -> Result<Self, Report<AuthzError>> {
        Ok(Self::new(
            Subject::parse(subject)?,
            Relation::new(relation)?,
            Object::parse(object)?,
        ))
    }
}

impl fmt::Display for RelationshipTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}

/// Query for every object of one type a subject reaches through a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// The subject.
    pub subject: Subject,
    /// The object type to enumerate.
    pub object_type: ObjectType,
    /// The relation to follow.
    pub relation: Relation,
}

impl ListQuery {
    /// Creates a new list query.
    #[must_use]
    pub fn new(subject: Subject, object_type: ObjectType, relation: Relation) -> Self {
        Self {
            subject,
            object_type,
            relation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: Report<AuthzError>) -> &'static str {
        match err.current_context() {
            AuthzError::InvalidInput { field, .. } => *field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn user_subject_uses_user_tag() {
        let subject = Subject::user("olive").expect("valid");
        assert_eq!(subject.to_string(), "user:olive");
        assert_eq!(subject.object().object_type().as_str(), "user");
        assert!(subject.relation().is_none());
    }

    #[test]
    fn object_parse_and_display_agree() {
        let object = Object::parse("doc:secret1").expect("valid");
        assert_eq!(object.object_type().as_str(), "doc");
        assert_eq!(object.id(), "secret1");
        assert_eq!(object.to_string(), "doc:secret1");
    }

    #[test]
    fn object_without_type_tag_is_rejected() {
        let err = Object::parse("secret1").unwrap_err();
        assert_eq!(field_of(err), "object");
    }

    #[test]
    fn whitespace_inputs_are_rejected() {
        assert_eq!(field_of(Subject::user("  ").unwrap_err()), "subject");
        assert_eq!(field_of(Relation::new(" \t").unwrap_err()), "relation");
        assert_eq!(field_of(Object::parse("   ").unwrap_err()), "object");
        assert_eq!(field_of(ObjectType::new("").unwrap_err()), "object type");
    }

    #[test]
    fn subject_errors_keep_the_underlying_reason() {
        let err = Subject::new("user", "a b").unwrap_err();
        match err.current_context() {
            AuthzError::InvalidInput { field, details } => {
                assert_eq!(*field, "subject");
                assert!(details.contains("whitespace"), "{details}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = Subject::new("us#er", "olive").unwrap_err();
        assert!(err.to_string().contains("reserved character '#'"));
    }

    #[test]
    fn userset_subject_round_trips() {
        let subject: Subject = "group:eng#member".parse().expect("valid");
        assert_eq!(subject.relation().map(Relation::as_str), Some("member"));
        assert_eq!(subject.to_string(), "group:eng#member");
    }

    #[test]
    fn subject_with_empty_userset_relation_is_rejected() {
        let err = Subject::parse("group:eng#").unwrap_err();
        assert_eq!(field_of(err), "subject");
    }

    #[test]
    fn user_id_cannot_inject_a_type() {
        assert!(Subject::user("doc:secret1").is_err());
    }

    #[test]
    fn tuple_display_uses_object_relation_subject_order() {
        let tuple = RelationshipTuple::parse("user:olive", "viewer", "doc:secret1").expect("valid");
        assert_eq!(tuple.to_string(), "doc:secret1#viewer@user:olive");
    }
}
