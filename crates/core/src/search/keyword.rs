//! 关键词检索：SHA-256 前 4 字节作为 key，在 galleriesindex 里远程下降。

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::fetch::{ready, FetchOptions, Fetcher, Outcome};
use crate::index::{fetch_ids_with_range, search_for_key, GalleryId, IndexLocation, Key};
use crate::settings::Settings;

/// 关键词 key 长度
pub const KEYWORD_KEY_LEN: usize = 4;

pub fn keyword_key(keyword: &str) -> Key {
    let digest = Sha256::digest(keyword.as_bytes());
    digest[..KEYWORD_KEY_LEN].to_vec()
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// 探测当前索引版本。索引在服务端周期性重建，每次检索都要重新取。
pub fn get_index_version(
    fetcher: &dyn Fetcher,
    settings: &Settings,
    options: &FetchOptions<'_>,
) -> Result<Outcome<u64>> {
    let url = format!(
        "{}/{}/version?_{}",
        settings.search_domain,
        settings.index_name,
        now_millis()
    );
    let opts = FetchOptions {
        range: None,
        ..*options
    };
    let bytes = ready!(fetcher.fetch(&url, &opts)?);
    let text = String::from_utf8_lossy(&bytes);
    let version = text
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Format(format!("invalid index version {:?}: {e}", text.trim())))?;
    Ok(Outcome::Done(version))
}

/// 未命中返回空列表；网络 / 格式错误原样返回，由调用方决定降级。
pub fn search_by_keyword(
    fetcher: &dyn Fetcher,
    settings: &Settings,
    keyword: &str,
    options: &FetchOptions<'_>,
) -> Result<Outcome<Vec<GalleryId>>> {
    let key = keyword_key(keyword);
    let version = ready!(get_index_version(fetcher, settings, options)?);
    let location = IndexLocation {
        search_domain: &settings.search_domain,
        index_name: &settings.index_name,
        version,
    };

    let range = ready!(search_for_key(
        fetcher,
        &location,
        &key,
        options,
        settings.max_hops
    )?);
    if range.is_empty() {
        tracing::debug!(keyword, version, "关键词未命中");
        return Ok(Outcome::Done(Vec::new()));
    }
    fetch_ids_with_range(fetcher, &location, range, options)
}
