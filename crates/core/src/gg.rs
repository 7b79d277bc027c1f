//! GG 路由表：从 gg.js 提取“图片 hash → 资源子域名”的映射。
//!
//! 整张表作为一个不可变快照存放在 `ArcSwap` 里：读方 `snapshot()` 拿到 `Arc`，
//! 写方持有互斥锁生成新快照后一次性替换，读方不会看到更新到一半的表。

use arc_swap::ArcSwap;
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::error::{Error, Result};
use crate::fetch::{FetchOptions, Fetcher, Outcome};
use crate::settings::Settings;

/// 12 位 hash 对应的表长
pub const SUBDOMAIN_TABLE_SIZE: usize = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgSnapshot {
    /// 内容变化时 +1
    pub version: u64,
    /// 内容未变时 +1，版本变化时归零
    pub revision: u64,
    /// 资源路径片段（gg.js 里的 `b`）
    pub path: String,
    subdomain_table: Box<[bool]>,
}

impl Default for GgSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            revision: 0,
            path: String::new(),
            subdomain_table: vec![false; SUBDOMAIN_TABLE_SIZE].into_boxed_slice(),
        }
    }
}

impl GgSnapshot {
    /// `hash` 必须是 3 位十六进制（图片 hash 的最后一位 + 倒数第三、二位）
    pub fn get_subdomain(&self, hash: &str) -> Result<bool> {
        let index = parse_hash3(hash)?;
        Ok(self.subdomain_table[index])
    }

    /// 标记为非默认子域名的条目数
    pub fn flagged_count(&self) -> usize {
        self.subdomain_table.iter().filter(|&&b| b).count()
    }
}

pub(crate) fn parse_hash3(hash: &str) -> Result<usize> {
    if hash.len() != 3 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidHash(hash.to_string()));
    }
    usize::from_str_radix(hash, 16).map_err(|_| Error::InvalidHash(hash.to_string()))
}

/// 取 `begin_mark` 与其后第一个 `end_mark` 之间的文本，任一标记缺失返回 None。
fn extract_between<'a>(text: &'a str, begin_mark: &str, end_mark: &str) -> Option<&'a str> {
    let a = text.find(begin_mark)? + begin_mark.len();
    let rest = &text[a..];
    let b = rest.find(end_mark)?;
    Some(&rest[..b])
}

fn case_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"case\s+(\d+)").ok()).as_ref()
}

/// gg.js 的提取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgScript {
    pub default_flag: bool,
    pub table: Box<[bool]>,
    pub path: String,
}

/// 只做固定模式提取，不解析 JS：
/// - `var o = X;` 为默认值，`X == 1` 时为真；
/// - `switch (g) {` 到 `o = ` 之间每个 `case N` 把第 N 项翻转为非默认值；
/// - `b: '...'/'` 为路径片段。
pub fn parse_gg_script(js: &str) -> GgScript {
    let default_flag = extract_between(js, "var o = ", ";").map(str::trim) == Some("1");
    let mut table = vec![default_flag; SUBDOMAIN_TABLE_SIZE].into_boxed_slice();

    if let (Some(cases), Some(re)) = (extract_between(js, "switch (g) {", "o = "), case_regex()) {
        for cap in re.captures_iter(cases) {
            match cap[1].parse::<usize>() {
                Ok(n) if n < SUBDOMAIN_TABLE_SIZE => table[n] = !default_flag,
                _ => tracing::warn!("gg.js case 超出范围，已忽略: {}", &cap[1]),
            }
        }
    }

    let path = extract_between(js, "b: '", "/'").unwrap_or_default().to_string();
    GgScript {
        default_flag,
        table,
        path,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GgUpdate {
    Changed,
    Unchanged,
}

/// 下载失败后是否值得再试一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

/// 进程内唯一的路由表，由应用根创建并以 `Arc` 共享。
pub struct GgTable {
    current: ArcSwap<GgSnapshot>,
    /// 串行化写方
    update_lock: Mutex<()>,
    fetcher: Arc<dyn Fetcher>,
    script_url: String,
    referer: String,
}

impl GgTable {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: &Settings) -> Self {
        Self {
            current: ArcSwap::from_pointee(GgSnapshot::default()),
            update_lock: Mutex::new(()),
            fetcher,
            script_url: settings.gg_script_url.clone(),
            referer: settings.referer.clone(),
        }
    }

    /// 当前快照（共享只读视图）
    pub fn snapshot(&self) -> Arc<GgSnapshot> {
        self.current.load_full()
    }

    pub fn get_subdomain(&self, hash: &str) -> Result<bool> {
        self.current.load().get_subdomain(hash)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.update_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 重新拉取 gg.js。
    ///
    /// 路径片段与缓存相同：revision + 1，返回 `Unchanged`；
    /// 否则整表替换，version + 1、revision 归零，返回 `Changed`。
    /// 拉取失败时表保持不变。
    pub fn update(&self) -> Result<GgUpdate> {
        let _guard = self.lock();
        self.update_locked()
    }

    fn update_locked(&self) -> Result<GgUpdate> {
        let options = FetchOptions {
            referer: Some(self.referer.as_str()),
            ..Default::default()
        };
        let js = match self.fetcher.fetch(&self.script_url, &options)? {
            Outcome::Done(bytes) => bytes,
            Outcome::Aborted => return Err(Error::Network("gg.js fetch aborted".to_string())),
        };
        let script = parse_gg_script(&String::from_utf8_lossy(&js));

        let current = self.current.load_full();
        // version 0 是构造时的空表，第一次拉取总要发布
        if current.version > 0 && script.path == current.path {
            let next = GgSnapshot {
                revision: current.revision + 1,
                ..(*current).clone()
            };
            tracing::debug!(
                version = next.version,
                revision = next.revision,
                "gg.js 未变化"
            );
            self.current.store(Arc::new(next));
            return Ok(GgUpdate::Unchanged);
        }

        let next = GgSnapshot {
            version: current.version + 1,
            revision: 0,
            path: script.path,
            subdomain_table: script.table,
        };
        tracing::info!(version = next.version, path = %next.path, "gg.js 已更新");
        self.current.store(Arc::new(next));
        Ok(GgUpdate::Changed)
    }

    /// 资源下载失败后的“刷新后重试一次”判定。`seen` 为开始下载时取到的快照。
    ///
    /// - 表的 version 已经比 `seen` 新：别人刷新过，直接重试；
    /// - revision 自 `seen` 起没动过：自己刷新，内容变了才重试；
    /// - 否则别人已经确认过表没变，放弃。
    pub fn refresh_after_failure(&self, seen: &GgSnapshot) -> Result<RetryDecision> {
        let _guard = self.lock();
        let current = self.current.load_full();
        if current.version > seen.version {
            return Ok(RetryDecision::Retry);
        }
        if current.revision == seen.revision {
            return Ok(match self.update_locked()? {
                GgUpdate::Changed => RetryDecision::Retry,
                GgUpdate::Unchanged => RetryDecision::GiveUp,
            });
        }
        Ok(RetryDecision::GiveUp)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_GG: &str = "gg = {\nm: function(g) {\nvar o = 0;\nswitch (g) {\ncase 255:\ncase 4000:\no = 1; break;\n}\nreturn o;\n},\ns: function(h) { return h; },\nb: '1712345678/'\n};";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;

    const GG_URL: &str = "ltn.test/gg.js";

    fn table(fetcher: Arc<StubFetcher>) -> GgTable {
        let settings = Settings {
            gg_script_url: GG_URL.to_string(),
            ..Settings::default()
        };
        GgTable::new(fetcher, &settings)
    }

    #[test]
    fn test_parse_sample_script() {
        let script = parse_gg_script(SAMPLE_GG);
        assert!(!script.default_flag);
        assert_eq!(script.path, "1712345678");
        assert!(script.table[255]);
        assert!(script.table[4000]);
        assert!(!script.table[0]);
        assert_eq!(script.table.iter().filter(|&&b| b).count(), 2);
    }

    #[test]
    fn test_parse_without_markers_uses_default_only() {
        let script = parse_gg_script("var o = 1; nothing else here");
        assert!(script.default_flag);
        assert!(script.table.iter().all(|&b| b));
        assert_eq!(script.path, "");

        let script = parse_gg_script("");
        assert!(script.table.iter().all(|&b| !b));
    }

    #[test]
    fn test_parse_ignores_out_of_range_case() {
        let script = parse_gg_script("var o = 1;\nswitch (g) {\ncase 9999:\ncase 7:\no = 0; break;\n}");
        assert!(!script.table[7]);
        assert_eq!(script.table.iter().filter(|&&b| !b).count(), 1);
    }

    #[test]
    fn test_update_version_and_revision() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, SAMPLE_GG.as_bytes().to_vec());
        let gg = table(fetcher.clone());

        assert_eq!(gg.update().unwrap(), GgUpdate::Changed);
        let s = gg.snapshot();
        assert_eq!((s.version, s.revision), (1, 0));

        assert_eq!(gg.update().unwrap(), GgUpdate::Unchanged);
        let s = gg.snapshot();
        assert_eq!((s.version, s.revision), (1, 1));
        assert!(s.get_subdomain("0ff").unwrap());

        fetcher.body(GG_URL, SAMPLE_GG.replace("1712345678", "1712349999").into_bytes());
        assert_eq!(gg.update().unwrap(), GgUpdate::Changed);
        let s = gg.snapshot();
        assert_eq!((s.version, s.revision), (2, 0));
        assert_eq!(s.path, "1712349999");
    }

    #[test]
    fn test_first_update_without_path_applies_default() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, b"var o = 1; nothing else".to_vec());
        let gg = table(fetcher);

        assert_eq!(gg.update().unwrap(), GgUpdate::Changed);
        let s = gg.snapshot();
        assert_eq!((s.version, s.revision), (1, 0));
        assert_eq!(s.path, "");
        assert!(gg.get_subdomain("0ff").unwrap());
        assert_eq!(s.flagged_count(), SUBDOMAIN_TABLE_SIZE);

        assert_eq!(gg.update().unwrap(), GgUpdate::Unchanged);
        assert_eq!(gg.snapshot().revision, 1);
    }

    #[test]
    fn test_failed_fetch_leaves_table_untouched() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.status(GG_URL, 503);
        let gg = table(fetcher);
        assert!(gg.update().is_err());
        assert_eq!(*gg.snapshot(), GgSnapshot::default());
    }

    #[test]
    fn test_get_subdomain() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, SAMPLE_GG.as_bytes().to_vec());
        let gg = table(fetcher);
        gg.update().unwrap();

        assert!(gg.get_subdomain("0ff").unwrap());
        assert!(gg.get_subdomain("0FF").unwrap());
        assert!(!gg.get_subdomain("100").unwrap());
        assert!(matches!(gg.get_subdomain("zzz"), Err(Error::InvalidHash(_))));
        assert!(matches!(gg.get_subdomain("0f"), Err(Error::InvalidHash(_))));
        assert!(matches!(gg.get_subdomain("+ff"), Err(Error::InvalidHash(_))));
    }

    #[test]
    fn test_refresh_after_failure() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, SAMPLE_GG.as_bytes().to_vec());
        let gg = table(fetcher.clone());
        gg.update().unwrap();

        // 表没变：刷新一次后放弃
        let seen = gg.snapshot();
        assert_eq!(gg.refresh_after_failure(&seen).unwrap(), RetryDecision::GiveUp);
        assert_eq!(gg.snapshot().revision, 1);
        // 同一个 seen 再失败：别人已经确认过，不再请求
        let before = fetcher.request_count();
        assert_eq!(gg.refresh_after_failure(&seen).unwrap(), RetryDecision::GiveUp);
        assert_eq!(fetcher.request_count(), before);

        // 表变了：重试
        let seen = gg.snapshot();
        fetcher.body(GG_URL, SAMPLE_GG.replace("1712345678", "1").into_bytes());
        assert_eq!(gg.refresh_after_failure(&seen).unwrap(), RetryDecision::Retry);
        // 旧快照的持有者看到 version 已前进，直接重试
        assert_eq!(gg.refresh_after_failure(&seen).unwrap(), RetryDecision::Retry);
    }

    #[test]
    fn test_readers_see_whole_snapshots() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, SAMPLE_GG.as_bytes().to_vec());
        let gg = Arc::new(table(fetcher));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let gg = Arc::clone(&gg);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let s = gg.snapshot();
                        // version 0 时是空表，之后每个快照都含两项翻转
                        let expected = if s.version == 0 { 0 } else { 2 };
                        assert_eq!(s.flagged_count(), expected);
                    }
                });
            }
            for _ in 0..20 {
                gg.update().unwrap();
            }
        });
        assert_eq!(gg.snapshot().revision, 19);
    }
}
