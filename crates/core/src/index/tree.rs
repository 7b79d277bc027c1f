use super::node::{IndexNode, MAX_NODE_SIZE};
use super::Range;
use crate::error::{Error, Result};
use crate::fetch::{ready, FetchOptions, Fetcher, Outcome};

/// 某个版本的 galleriesindex 在远端的位置。
#[derive(Debug, Clone, Copy)]
pub struct IndexLocation<'a> {
    pub search_domain: &'a str,
    pub index_name: &'a str,
    pub version: u64,
}

impl IndexLocation<'_> {
    pub fn index_url(&self) -> String {
        format!(
            "{}/{}/galleries.{}.index",
            self.search_domain, self.index_name, self.version
        )
    }

    pub fn data_url(&self) -> String {
        format!(
            "{}/{}/galleries.{}.data",
            self.search_domain, self.index_name, self.version
        )
    }
}

fn get_node_at_address(
    fetcher: &dyn Fetcher,
    location: &IndexLocation<'_>,
    address: u64,
    options: &FetchOptions<'_>,
) -> Result<Outcome<IndexNode>> {
    let end = address
        .checked_add(MAX_NODE_SIZE - 1)
        .ok_or_else(|| Error::IndexCorrupt(format!("node address {address} out of range")))?;
    let opts = FetchOptions {
        range: Some(Range::new(address, end)),
        ..*options
    };
    let bytes = ready!(fetcher.fetch(&location.index_url(), &opts)?);
    Ok(Outcome::Done(IndexNode::decode(&bytes)?))
}

/// 从根节点（地址 0）开始远程下降查找 `key`。
///
/// 命中返回数据区间；叶子上未命中返回 [`Range::EMPTY`]。
/// 非叶子节点的子地址为 0、或跳数超过 `max_hops`，都按 `IndexCorrupt` 处理。
pub fn search_for_key(
    fetcher: &dyn Fetcher,
    location: &IndexLocation<'_>,
    key: &[u8],
    options: &FetchOptions<'_>,
    max_hops: u32,
) -> Result<Outcome<Range>> {
    let mut address = 0u64;
    for hop in 1..=max_hops {
        let node = ready!(get_node_at_address(fetcher, location, address, options)?);
        let (found, index) = node.locate_key(key);
        tracing::debug!(hop, address, found, index, "index node");

        if found {
            let range = node.data(index).ok_or_else(|| {
                Error::IndexCorrupt(format!("key {index} at {address} has no data"))
            })?;
            return Ok(Outcome::Done(range));
        }
        if node.is_leaf() {
            return Ok(Outcome::Done(Range::EMPTY));
        }
        address = match node.subnode_address(index) {
            Some(0) | None => {
                return Err(Error::IndexCorrupt(format!(
                    "non-root subnode address is 0 (node {address}, slot {index})"
                )))
            }
            Some(next) => next,
        };
    }
    Err(Error::IndexCorrupt(format!(
        "descent exceeded {max_hops} hops"
    )))
}
