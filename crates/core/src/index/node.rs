use std::cmp::Ordering;

use super::reader::ByteReader;
use super::Range;
use crate::error::{Error, Result};

/// 单个节点最多抓取的字节数
pub const MAX_NODE_SIZE: u64 = 464;
/// key 最大长度
pub const MAX_KEY_LEN: u32 = 32;
/// 子节点地址槽位数（B 树阶数 16 + 1）
pub const SUBNODE_COUNT: usize = 17;

pub type Key = Vec<u8>;

/// galleriesindex 的一个 B 树节点。
///
/// ```text
/// u32 key_count
/// key_count × { u32 key_len; key_len bytes }
/// u32 data_count
/// data_count × { u64 offset; u32 length }
/// 17 × u64 subnode_address
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNode {
    keys: Vec<Key>,
    datas: Vec<Range>,
    subnode_addresses: [u64; SUBNODE_COUNT],
}

/// 逐字节无符号比较到较短者长度，公共前缀相同时短的更小。
fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl IndexNode {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut arr = ByteReader::new(bytes);

        let keys_limit = arr.read_u32_be()?;
        let mut keys = Vec::new();
        for _ in 0..keys_limit {
            let key_size = arr.read_u32_be()?;
            if key_size > MAX_KEY_LEN {
                return Err(Error::Format(format!("key size {key_size} is too long")));
            }
            keys.push(arr.read_bytes(key_size as usize)?.to_vec());
        }

        let datas_limit = arr.read_u32_be()?;
        if datas_limit != keys_limit {
            return Err(Error::Format(format!(
                "data count {datas_limit} does not match key count {keys_limit}"
            )));
        }
        let mut datas = Vec::with_capacity(keys.len());
        for _ in 0..datas_limit {
            let offset = arr.read_u64_be()?;
            let length = arr.read_u32_be()?;
            let end = offset
                .checked_add(u64::from(length))
                .and_then(|e| e.checked_sub(1))
                .filter(|_| length > 0)
                .ok_or_else(|| {
                    Error::Format(format!("invalid data range: offset {offset} length {length}"))
                })?;
            datas.push(Range::new(offset, end));
        }

        let mut subnode_addresses = [0u64; SUBNODE_COUNT];
        for slot in subnode_addresses.iter_mut() {
            *slot = arr.read_u64_be()?;
        }

        Ok(Self {
            keys,
            datas,
            subnode_addresses,
        })
    }

    /// 线性扫描，返回 `(是否精确命中, 第一个 >= key 的下标)`；全部小于 key 时下标为 `keys.len()`。
    pub fn locate_key(&self, key: &[u8]) -> (bool, usize) {
        for (i, k) in self.keys.iter().enumerate() {
            match compare_keys(key, k) {
                Ordering::Greater => continue,
                Ordering::Equal => return (true, i),
                Ordering::Less => return (false, i),
            }
        }
        (false, self.keys.len())
    }

    pub fn is_leaf(&self) -> bool {
        self.subnode_addresses.iter().all(|&a| a == 0)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn data(&self, index: usize) -> Option<Range> {
        self.datas.get(index).copied()
    }

    pub fn subnode_address(&self, index: usize) -> Option<u64> {
        self.subnode_addresses.get(index).copied()
    }
}

#[cfg(test)]
pub(crate) fn encode_node(entries: &[(&[u8], u64, u32)], subnodes: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (key, _, _) in entries {
        out.extend_from_slice(&(key.len() as u32).to_be_bytes());
        out.extend_from_slice(key);
    }
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (_, offset, length) in entries {
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
    }
    for i in 0..SUBNODE_COUNT {
        let address = subnodes.get(i).copied().unwrap_or(0);
        out.extend_from_slice(&address.to_be_bytes());
    }
    out
}
