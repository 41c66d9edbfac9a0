//! Post collection from Weibo search.

pub mod search;
pub mod timestamp;
pub mod window;

pub use search::{SearchSource, WeiboSearch, WeiboSearchConfig};
pub use window::{CollectStats, WindowedCollector};
