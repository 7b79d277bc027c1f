//! 扁平 id 列表（`.nozomi`）：作者 / 社团 / 系列 / 角色 / 类型 / 标签 / 语言。

use super::query::PredicateKind;
use crate::error::Result;
use crate::fetch::{ready, FetchOptions, Fetcher, Outcome};
use crate::index::GalleryId;
use crate::settings::Settings;

/// 各谓词对应的列表地址（不含 scheme，未转义）。关键词没有扁平列表，返回 None。
pub fn category_url(settings: &Settings, kind: PredicateKind, value: &str) -> Option<String> {
    let domain = &settings.search_domain;
    let ext = &settings.node_extension;
    let url = match kind {
        PredicateKind::Artist
        | PredicateKind::Group
        | PredicateKind::Series
        | PredicateKind::Character
        | PredicateKind::Type => format!("{domain}/{}/{value}-all.{ext}", kind.name()),
        PredicateKind::Tag if value == "index" => format!("{domain}/index-all.{ext}"),
        PredicateKind::Tag => format!("{domain}/tag/{value}-all.{ext}"),
        PredicateKind::Language => format!("{domain}/index-{value}.{ext}"),
        PredicateKind::Keyword => return None,
    };
    Some(url)
}

/// 大端 `u32[]`，长度由响应体决定；末尾不足 4 字节的部分丢弃。
pub fn decode_flat_ids(bytes: &[u8]) -> Vec<GalleryId> {
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        tracing::warn!(
            "扁平列表长度 {} 不是 4 的倍数，丢弃末尾 {} 字节",
            bytes.len(),
            chunks.remainder().len()
        );
    }
    chunks
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn fetch_by_category(
    fetcher: &dyn Fetcher,
    settings: &Settings,
    kind: PredicateKind,
    value: &str,
    options: &FetchOptions<'_>,
) -> Result<Outcome<Vec<GalleryId>>> {
    let Some(url) = category_url(settings, kind, value) else {
        return Ok(Outcome::Done(Vec::new()));
    };
    // 扁平列表整体下载，不带 Range
    let opts = FetchOptions {
        range: None,
        ..*options
    };
    let bytes = ready!(fetcher.fetch(&url, &opts)?);
    Ok(Outcome::Done(decode_flat_ids(&bytes)))
}
