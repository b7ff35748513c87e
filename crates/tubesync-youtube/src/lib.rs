pub mod response;
pub mod source;

pub use response::{ListResponse, PageInfo};
pub use source::{YouTubeSource, YouTubeSourceConfig};
