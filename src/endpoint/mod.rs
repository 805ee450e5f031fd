pub mod collection_end_point;
pub mod data_keeper;
pub mod lazy_keeper;
pub mod listener;
pub mod load_state;
pub mod loader;
pub mod map;
pub mod object_end_point;
pub mod provider;

pub use collection_end_point::{CollectionEndPoint, CollectionEndPointServices};
pub use data_keeper::CollectionEndPointDataKeeper;
pub use lazy_keeper::LazyLoadingCollectionEndPointDataKeeper;
pub use listener::{
    ClientTransactionListener, LoggedEvent, NullTransactionListener, StateUpdateListener,
    TransactionEvent, TransactionEventLog, VirtualEndPointStateUpdateListener,
};
pub use load_state::{
    CollectionEndPointLoadState, CompleteLoadState, EndPointReport, IncompleteLoadState,
};
pub use loader::{InMemoryObjectStore, LoadedObject, ObjectLoader};
pub use map::RelationEndPointMap;
pub use object_end_point::RealObjectEndPoint;
pub use provider::RelationEndPointProvider;
