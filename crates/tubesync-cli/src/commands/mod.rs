pub mod channel;
pub mod format;
pub mod playlists;
pub mod stats;
pub mod sync;
pub mod videos;
