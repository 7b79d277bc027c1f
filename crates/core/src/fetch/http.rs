//! HTTP(S) 抓取实现：reqwest blocking 客户端 + 503 固定间隔重试 + 可取消的响应体读取。

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client;
use reqwest::header::{RANGE, REFERER};
use reqwest::StatusCode;
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use super::{FetchOptions, Fetcher, Outcome};
use crate::error::{Error, Result};
use crate::settings::Settings;

/// 除字母数字与 `-_.~/?` 外全部转义（大写十六进制）
const URL_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b'?');

/// 重试等待时检查取消标记的粒度
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// 按 Content-Length 预分配的上限，实际长度以读到的为准
const MAX_PREALLOC: u64 = 4 * 1024 * 1024;

pub fn encode_url(url: &str) -> String {
    utf8_percent_encode(url, URL_ESCAPE).to_string()
}

pub struct HttpFetcher {
    client: Client,
    scheme: &'static str,
    timeout: Duration,
    retry_count: u32,
    retry_interval: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::build(settings, true)
    }

    fn build(settings: &Settings, use_env_proxy: bool) -> Result<Self> {
        let mut client_builder = Client::builder();

        if use_env_proxy {
            if let Ok(proxy_url) = std::env::var("HTTPS_PROXY")
                .or_else(|_| std::env::var("https_proxy"))
                .or_else(|_| std::env::var("HTTP_PROXY"))
                .or_else(|_| std::env::var("http_proxy"))
            {
                if !proxy_url.trim().is_empty() {
                    match reqwest::Proxy::all(&proxy_url) {
                        Ok(proxy) => {
                            client_builder = client_builder.proxy(proxy);
                            tracing::debug!("网络代理已配置: {proxy_url}");
                        }
                        Err(e) => {
                            tracing::warn!("代理配置无效 ({proxy_url}), 将使用直连: {e}");
                        }
                    }
                }
            }
        } else {
            client_builder = client_builder.no_proxy();
        }

        let client = client_builder
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            scheme: "https",
            timeout: settings.timeout(),
            retry_count: settings.retry_count,
            retry_interval: settings.retry_interval(),
        })
    }

    /// 等待一个重试间隔；期间被取消则返回 false。
    fn wait_retry(&self, options: &FetchOptions<'_>) -> bool {
        let deadline = Instant::now() + self.retry_interval;
        loop {
            if options.is_canceled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// 读响应体。带 Range 的请求最多接受 `range.len()` 字节。
    fn read_body(
        mut resp: reqwest::blocking::Response,
        options: &FetchOptions<'_>,
    ) -> std::result::Result<Outcome<Vec<u8>>, BodyError> {
        let limit = options.range.map(|r| r.len());
        let prealloc = resp
            .content_length()
            .unwrap_or(0)
            .min(limit.unwrap_or(MAX_PREALLOC))
            .min(MAX_PREALLOC);
        let mut buffer = Vec::with_capacity(prealloc as usize);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            if options.is_canceled() {
                return Ok(Outcome::Aborted);
            }
            let n = resp.read(&mut chunk).map_err(BodyError::Io)?;
            if n == 0 {
                return Ok(Outcome::Done(buffer));
            }
            buffer.extend_from_slice(&chunk[..n]);
            match limit {
                Some(limit) if buffer.len() as u64 > limit => {
                    return Err(BodyError::TooLong(limit));
                }
                _ => {}
            }
        }
    }
}

enum BodyError {
    /// 连接中断等，可以重试
    Io(std::io::Error),
    /// 超过请求的区间长度，重试也没用
    TooLong(u64),
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, options: &FetchOptions<'_>) -> Result<Outcome<Vec<u8>>> {
        // 主机部分（可能带端口）原样保留，只转义路径
        let full = match url.split_once('/') {
            Some((host, path)) => format!("{}://{host}/{}", self.scheme, encode_url(path)),
            None => format!("{}://{url}", self.scheme),
        };
        let target =
            Url::parse(&full).map_err(|e| Error::Network(format!("Invalid url {full}: {e}")))?;
        let max_attempts = self.retry_count.saturating_add(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if options.is_canceled() {
                return Ok(Outcome::Aborted);
            }

            let mut req = self
                .client
                .get(target.clone())
                .timeout(options.timeout.unwrap_or(self.timeout));
            if let Some(range) = options.range {
                req = req.header(RANGE, format!("bytes={}-{}", range.start, range.end));
            }
            if let Some(referer) = options.referer {
                req = req.header(REFERER, referer);
            }
            tracing::debug!(url = %target, range = ?options.range, attempt, "GET");

            let failure = match req.send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
                        match Self::read_body(resp, options) {
                            Ok(outcome) => return Ok(outcome),
                            Err(BodyError::TooLong(limit)) => {
                                return Err(Error::Format(format!(
                                    "response longer than requested range of {limit} bytes ({target})"
                                )));
                            }
                            Err(BodyError::Io(e)) => format!("Failed to read response: {e}"),
                        }
                    } else if status == StatusCode::SERVICE_UNAVAILABLE {
                        format!("HTTP error: {status}")
                    } else {
                        return Err(Error::Network(format!("HTTP error: {status} ({target})")));
                    }
                }
                Err(e) => format!("Failed to fetch: {e}"),
            };

            if attempt >= max_attempts {
                return Err(Error::Network(format!("{failure} ({target})")));
            }
            tracing::warn!(
                "请求失败，将在 {}ms 后重试 ({attempt}/{max_attempts})：{failure}",
                self.retry_interval.as_millis()
            );
            if !self.wait_retry(options) {
                return Ok(Outcome::Aborted);
            }
        }
    }
}
