pub mod error;
pub mod types;

pub use error::{RelationError, Result};
pub use types::{ChangeState, ClassId, ObjectId, RelationEndPointId, SyncState};
