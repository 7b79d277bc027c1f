//! galleriesindex 二进制协议：节点解码、远程 B 树下降、id 列表解码。

pub mod data;
pub mod node;
pub mod reader;
pub mod tree;

pub use data::{decode_id_list, fetch_ids_with_range, MAX_GALLERY_IDS};
pub use node::{IndexNode, Key, MAX_KEY_LEN, MAX_NODE_SIZE, SUBNODE_COUNT};
pub use reader::ByteReader;
pub use tree::{search_for_key, IndexLocation};

/// 画廊 id，由目录服务分配
pub type GalleryId = u32;

/// 远程数据块内的闭区间字节范围。`(0, 0)` 表示“未命中”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub const EMPTY: Range = Range { start: 0, end: 0 };

    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// 区间字节数（闭区间）
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }
}
