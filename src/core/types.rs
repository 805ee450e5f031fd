use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of a mapped domain class, e.g. `"Order"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClassId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a persisted domain object.
///
/// Objects are identity-mapped per transaction, so two equal IDs always
/// denote the same in-memory object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: ClassId,
    value: Uuid,
}

impl ObjectId {
    /// Generate a new random ID for the given class
    pub fn new(class_id: impl Into<ClassId>) -> Self {
        Self {
            class_id: class_id.into(),
            value: Uuid::new_v4(),
        }
    }

    pub fn with_value(class_id: impl Into<ClassId>, value: Uuid) -> Self {
        Self {
            class_id: class_id.into(),
            value,
        }
    }

    /// Deterministic ID derived from a name (UUID v5), handy for fixtures and stores keyed by name.
    pub fn from_name(class_id: impl Into<ClassId>, name: &str) -> Self {
        Self {
            class_id: class_id.into(),
            value: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
        }
    }

    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    pub fn value(&self) -> Uuid {
        self.value
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_id, self.value)
    }
}

/// Identifies one side of a relation for one object: the owning object plus the
/// fully qualified property name (`"Order.OrderItems"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationEndPointId {
    object_id: ObjectId,
    property_name: String,
}

impl RelationEndPointId {
    pub fn new(object_id: ObjectId, property_name: impl Into<String>) -> Self {
        Self {
            object_id,
            property_name: property_name.into(),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.property_name)
    }
}

/// Result of change detection as seen by listeners.
///
/// `Unknown` means the cached value was invalidated and has not been
/// recomputed yet; it is deliberately distinct from `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Unknown,
    Changed,
    Unchanged,
}

impl ChangeState {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            ChangeState::Changed
        } else {
            ChangeState::Unchanged
        }
    }

    /// `None` for `Unknown`, the boolean otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ChangeState::Unknown => None,
            ChangeState::Changed => Some(true),
            ChangeState::Unchanged => Some(false),
        }
    }
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeState::Unknown => write!(f, "UNKNOWN"),
            ChangeState::Changed => write!(f, "CHANGED"),
            ChangeState::Unchanged => write!(f, "UNCHANGED"),
        }
    }
}

/// Whether a real (foreign-key) end-point agrees with the collection on the other side.
///
/// ```text
/// Unknown ──collection loaded, item present──> Synchronized
///    │
///    └──collection loaded, item missing──> Unsynchronized ──synchronize──> Synchronized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unknown,
    Synchronized,
    Unsynchronized,
}

impl SyncState {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SyncState::Unknown => None,
            SyncState::Synchronized => Some(true),
            SyncState::Unsynchronized => Some(false),
        }
    }
}
