use thiserror::Error;

/// nozomi-core 统一错误类型。
///
/// 搜索流程里的降级规则：`Network` / `Format` / `Truncated` 只会让单个谓词退化为空集，
/// `IndexCorrupt` 则直接返回给调用方。
#[derive(Debug, Error)]
pub enum Error {
    /// 缓冲区剩余字节不足以完成一次读取
    #[error("truncated buffer: need {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// 节点 / id 列表字节格式不合法
    #[error("format error: {0}")]
    Format(String),

    /// 索引结构本身矛盾（非叶子节点子地址为 0、跳数超限）
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// 无数据、超时、非 200/206 状态码
    #[error("network failure: {0}")]
    Network(String),

    /// get_subdomain 收到的不是 3 位十六进制
    #[error("invalid hash: {0:?}")]
    InvalidHash(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 该错误是否只应让所属谓词退化为空集（而不是中断整个查询）。
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Format(_) | Error::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
