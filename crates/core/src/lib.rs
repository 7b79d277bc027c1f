//! nozomi 核心库：直接读取远端目录站发布的二进制索引，解析画廊 id。
//!
//! 入口是 [`SearchEngine`]；图片地址需要的 GG 路由表见 [`gg`]。

pub mod asset;
pub mod error;
pub mod fetch;
pub mod gg;
pub mod index;
pub mod search;
pub mod settings;

pub use asset::{with_route, ImageFile, ImageFormat};
pub use error::{Error, Result};
pub use fetch::{CancelFlag, FetchOptions, Fetcher, HttpFetcher, Outcome};
pub use gg::{GgSnapshot, GgTable, GgUpdate, RetryDecision};
pub use index::{GalleryId, Range};
pub use search::{predicate_help, FoldStrategy, SearchEngine, SearchReport, SearchWarning};
pub use settings::Settings;
