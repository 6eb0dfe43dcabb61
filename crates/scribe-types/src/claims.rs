use serde_json::{Map, Value};

/// Named values carried inside a signed token.
pub type ClaimMap = Map<String, Value>;

/// A persisted record whose fields can be embedded in, and later checked
/// against, token claims.
pub trait ClaimSubject {
    fn subject_id(&self) -> i64;

    /// Current value of the field called `name`, or `None` if the record has
    /// no such field.
    fn claim(&self, name: &str) -> Option<Value>;
}
