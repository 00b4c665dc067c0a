//! Capability interface the tracer uses to look at runtime values.
//!
//! The sandbox implements [`Inspect`] for its interpreter's value type, so the
//! recording and rendering code never depends on the runtime directly.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InspectError(pub String);

impl InspectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Coarse classification of a runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A scalar outside the cases above, such as an arbitrary-size integer.
    OtherScalar,
    Sequence,
    Mapping,
    Set,
    /// An instance of a user-defined class.
    Object,
    /// Functions, modules, classes and anything else.
    Opaque,
}

impl ValueKind {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueKind::None
                | ValueKind::Bool(_)
                | ValueKind::Int(_)
                | ValueKind::Float(_)
                | ValueKind::Str(_)
                | ValueKind::OtherScalar
        )
    }

    /// Scalars and sequences are shown as loop table columns.
    pub fn is_tabular(&self) -> bool {
        self.is_scalar() || matches!(self, ValueKind::Sequence)
    }
}

pub trait Inspect: Sized {
    fn kind(&self) -> ValueKind;

    fn type_name(&self) -> String;

    /// The value's `str()` form.
    fn natural_str(&self) -> Result<String, InspectError>;

    /// Instance attribute lookup; `Ok(None)` when the attribute is absent.
    fn attribute(&self, name: &str) -> Result<Option<Self>, InspectError>;

    /// Elements of a sequence, list or tuple.
    fn items(&self) -> Result<Vec<Self>, InspectError>;

    /// Entry lookup in a mapping with string keys.
    fn lookup(&self, key: &str) -> Result<Option<Self>, InspectError>;

    /// String-keyed entries of a mapping, in insertion order.
    fn entries(&self) -> Result<Vec<(String, Self)>, InspectError>;

    fn truthy(&self) -> Result<bool, InspectError>;
}
