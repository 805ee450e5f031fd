// ============================================================================
// Relation Transaction Module
// ============================================================================
//
// Per-transaction relation bookkeeping:
// - RelationEndPointManager: owns every end-point, expands and runs edits
// - DomainObjectCollection: collection façade over one end-point
// - BidirectionalRelationSyncService: repairs out-of-sync relations
//
// ============================================================================

pub mod collection;
pub mod manager;
pub mod sync;

pub use collection::DomainObjectCollection;
pub use manager::RelationEndPointManager;
pub use sync::BidirectionalRelationSyncService;
