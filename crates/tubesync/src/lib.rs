pub mod model;
pub mod normalize;
pub mod page;
pub mod retry;
pub mod sink;
pub mod source;
pub mod sync;

pub use model::{
    Channel, ChannelHandle, ChannelId, EntityKind, EntityRef, LiveStreamingDetails, Page,
    PageToken, Playlist, PlaylistId, Thumbnails, Video, VideoId,
};
pub use normalize::ConversionError;
pub use page::{PageWalker, collect_pages};
pub use retry::{ExponentialBackoff, NoRetry, RetryPolicy};
pub use sink::{CatalogSink, SinkError};
pub use source::{CatalogSource, MAX_PAGE_SIZE, SourceError};
pub use sync::{PersistCounts, SyncError, SyncOptions, SyncReport, SyncStage, Synchronizer};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
