pub mod change_caching;
pub mod data;
pub mod strategy;
pub mod tracking;

pub use change_caching::ChangeCachingCollectionData;
pub use data::{CollectionData, DomainObjectCollectionData, ReadOnlyCollectionData};
pub use strategy::{
    ChangeDetectionStrategy, RootCollectionChangeDetectionStrategy,
    SubCollectionChangeDetectionStrategy,
};
pub use tracking::EndPointTrackingCollectionData;
