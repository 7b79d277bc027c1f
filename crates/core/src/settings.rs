use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// 搜索引擎配置。所有字段都有默认值，配置文件里只需写要覆盖的项。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// 索引 / 扁平列表所在域名
    pub search_domain: String,
    /// 图片资源域名（子域名由 GG 表决定）
    pub asset_domain: String,
    /// 缩略图前缀
    pub thumbnail_url: String,
    /// gg.js 地址
    pub gg_script_url: String,
    /// 所有请求附带的 Referer
    pub referer: String,
    /// 扁平列表扩展名
    pub node_extension: String,
    /// B 树索引名（同时是版本探测路径）
    pub index_name: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 503 / 传输错误重试次数
    pub retry_count: u32,
    /// 重试间隔（毫秒，固定）
    pub retry_interval_ms: u64,
    /// 远程下降最大跳数，超过即视为索引损坏
    pub max_hops: u32,
    /// 同一次查询内的谓词是否并发拉取
    pub parallel_predicates: bool,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_domain: "ltn.gold-usergeneratedcontent.net".to_string(),
            asset_domain: "gold-usergeneratedcontent.net".to_string(),
            thumbnail_url: "btn.gold-usergeneratedcontent.net/webpbigtn".to_string(),
            gg_script_url: "ltn.gold-usergeneratedcontent.net/gg.js".to_string(),
            referer: "https://hitomi.la".to_string(),
            node_extension: "nozomi".to_string(),
            index_name: "galleriesindex".to_string(),
            timeout_secs: 30,
            retry_count: 3,
            retry_interval_ms: 1000,
            max_hops: 16,
            parallel_predicates: true,
            user_agent: "nozomi/0.3".to_string(),
        }
    }
}

impl Settings {
    /// 从 JSON 文件读取配置，缺失字段取默认值。
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    /// 有路径就读文件，否则使用默认配置。
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.search_domain.trim().is_empty() {
            return Err(Error::Config("searchDomain must not be empty".to_string()));
        }
        if self.max_hops == 0 {
            return Err(Error::Config("maxHops must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"searchDomain": "ltn.example.net", "retryCount": 1}}"#).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.search_domain, "ltn.example.net");
        assert_eq!(settings.retry_count, 1);
        // 未写的字段保持默认
        assert_eq!(settings.max_hops, 16);
        assert_eq!(settings.node_extension, "nozomi");
    }

    #[test]
    fn test_load_rejects_zero_hops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxHops": 0}}"#).unwrap();
        assert!(matches!(Settings::load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_default_without_path() {
        assert_eq!(Settings::load_or_default(None).unwrap(), Settings::default());
    }
}
