pub mod expanded;
pub mod modification;

pub use expanded::ExpandedCommand;
pub use modification::{RelationChange, RelationEndPointModification};
