//! 抓取层：搜索核心只依赖 [`Fetcher`] 这个能力，HTTP 实现见 [`http`]。

pub mod http;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::index::Range;

pub use http::{encode_url, HttpFetcher};

/// 调用方持有的取消标记。抓取层在请求前、重试间隔和读响应体时检查它。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单次请求参数
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions<'a> {
    /// 闭区间字节范围，对应 `Range: bytes=start-end`
    pub range: Option<Range>,
    pub referer: Option<&'a str>,
    /// 为 None 时使用实现方的默认超时
    pub timeout: Option<Duration>,
    pub cancel: Option<&'a CancelFlag>,
}

impl FetchOptions<'_> {
    pub fn is_canceled(&self) -> bool {
        self.cancel.map_or(false, |c| c.is_canceled())
    }
}

/// 请求结果：被取消不算错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    Aborted,
}

/// 取出 `Outcome::Done` 的值，`Aborted` 时直接向上返回 `Ok(Outcome::Aborted)`。
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::fetch::Outcome::Done(v) => v,
            $crate::fetch::Outcome::Aborted => return Ok($crate::fetch::Outcome::Aborted),
        }
    };
}
pub(crate) use ready;

/// `fetch(url, {range?, referer?, timeout, cancel?}) -> bytes | failure`
///
/// `url` 不带 scheme、未转义（例如 `ltn.example.net/tag/a b-all.nozomi`），由实现负责编码。
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, options: &FetchOptions<'_>) -> Result<Outcome<Vec<u8>>>;
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn fetch(&self, url: &str, options: &FetchOptions<'_>) -> Result<Outcome<Vec<u8>>> {
        (**self).fetch(url, options)
    }
}
