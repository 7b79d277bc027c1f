//! 查询引擎：解析参数 → 拉取各谓词的 id 集合 → 集合运算合并。

pub mod category;
pub mod keyword;
pub mod query;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::fetch::{CancelFlag, FetchOptions, Fetcher, HttpFetcher, Outcome};
use crate::index::GalleryId;
use crate::settings::Settings;

pub use category::{category_url, fetch_by_category};
pub use keyword::{get_index_version, keyword_key, search_by_keyword};
pub use query::{
    fold, parse_tokens, split_like_shell, FoldStrategy, ParseWarning, Polarity, PredicateKind,
    QueryToken,
};

/// 随结果一起返回的非致命问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchWarning {
    /// 参数无法识别，已跳过
    Parse(ParseWarning),
    /// 该谓词拉取失败，按空集参与合并
    Degraded { token: QueryToken, reason: String },
}

impl fmt::Display for SearchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchWarning::Parse(w) => write!(f, "skipped {w}"),
            SearchWarning::Degraded { token, reason } => {
                write!(f, "{token} treated as empty: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchReport {
    /// 升序、无重复
    pub ids: Vec<GalleryId>,
    pub warnings: Vec<SearchWarning>,
    /// 被调用方取消；此时 `ids` 为空
    pub aborted: bool,
}

pub struct SearchEngine {
    fetcher: Arc<dyn Fetcher>,
    settings: Settings,
    strategy: FoldStrategy,
}

impl SearchEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: Settings) -> Self {
        Self {
            fetcher,
            settings,
            strategy: FoldStrategy::Flat,
        }
    }

    /// 使用 HTTP 抓取实现
    pub fn with_http(settings: Settings) -> Result<Self> {
        let fetcher = HttpFetcher::new(&settings)?;
        Ok(Self::new(Arc::new(fetcher), settings))
    }

    pub fn with_strategy(mut self, strategy: FoldStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn search<S: AsRef<str>>(&self, args: &[S]) -> Result<SearchReport> {
        self.search_with_cancel(args, None)
    }

    /// 整串查询，按 shell 规则切分后检索
    pub fn search_str(&self, query: &str) -> Result<SearchReport> {
        self.search(&split_like_shell(query))
    }

    /// 派发到 tokio 阻塞线程池执行，调用方 await 结果即可。
    pub fn spawn_search(
        self: &Arc<Self>,
        args: Vec<String>,
        cancel: Option<CancelFlag>,
    ) -> tokio::task::JoinHandle<Result<SearchReport>> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.search_with_cancel(&args, cancel.as_ref()))
    }

    pub fn search_with_cancel<S: AsRef<str>>(
        &self,
        args: &[S],
        cancel: Option<&CancelFlag>,
    ) -> Result<SearchReport> {
        let polarity = self.strategy == FoldStrategy::Polarity;
        let (tokens, parse_warnings) = parse_tokens(args, polarity);
        let mut report = SearchReport {
            warnings: parse_warnings
                .into_iter()
                .inspect(|w| tracing::warn!("参数无法识别，已跳过: {w}"))
                .map(SearchWarning::Parse)
                .collect(),
            ..Default::default()
        };
        if tokens.is_empty() {
            return Ok(report);
        }

        let options = FetchOptions {
            referer: Some(self.settings.referer.as_str()),
            timeout: Some(self.settings.timeout()),
            cancel,
            ..Default::default()
        };
        let results = self.run_predicates(&tokens, &options);

        let mut lists = Vec::with_capacity(tokens.len());
        for (token, result) in tokens.into_iter().zip(results) {
            match result {
                Ok(Outcome::Done(ids)) => {
                    tracing::debug!("{token}: {} 条", ids.len());
                    lists.push((token.polarity, query::normalize(ids)));
                }
                Ok(Outcome::Aborted) => report.aborted = true,
                Err(e) if e.is_degradable() => {
                    tracing::warn!("{token} 拉取失败，按空集处理: {e}");
                    lists.push((token.polarity, Vec::new()));
                    report.warnings.push(SearchWarning::Degraded {
                        token,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if report.aborted {
            tracing::debug!("检索已取消");
            return Ok(report);
        }
        report.ids = fold(self.strategy, lists);
        Ok(report)
    }

    fn run_predicates(
        &self,
        tokens: &[QueryToken],
        options: &FetchOptions<'_>,
    ) -> Vec<Result<Outcome<Vec<GalleryId>>>> {
        if !self.settings.parallel_predicates || tokens.len() < 2 {
            return tokens
                .iter()
                .map(|t| self.run_predicate(t, options))
                .collect();
        }

        // 谓词之间没有数据依赖，各开一个线程；合并要等全部完成
        std::thread::scope(|scope| {
            let handles: Vec<_> = tokens
                .iter()
                .map(|t| scope.spawn(move || self.run_predicate(t, options)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn run_predicate(
        &self,
        token: &QueryToken,
        options: &FetchOptions<'_>,
    ) -> Result<Outcome<Vec<GalleryId>>> {
        let fetcher = self.fetcher.as_ref();
        match token.kind {
            PredicateKind::Keyword => {
                search_by_keyword(fetcher, &self.settings, &token.value, options)
            }
            kind => fetch_by_category(fetcher, &self.settings, kind, &token.value, options),
        }
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("settings", &self.settings)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// 供 CLI 打印帮助
pub fn predicate_help() -> String {
    let mut out = String::new();
    for kind in PredicateKind::ALL {
        out.push_str(&format!("    {}<value>  {}\n", kind.as_char(), kind.help()));
    }
    out.push_str(
        "With --polarity the following characters can be added as a prefix for each word:\n    '~' NOT\n    '|' OR\n    '&' AND\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fetch::testing::StubFetcher;
    use crate::index::node::encode_node;
    use crate::index::SUBNODE_COUNT;

    fn flat(ids: &[u32]) -> Vec<u8> {
        ids.iter().flat_map(|i| i.to_be_bytes()).collect()
    }

    fn engine(fetcher: Arc<StubFetcher>) -> SearchEngine {
        let settings = Settings {
            search_domain: "ltn.test".to_string(),
            ..Settings::default()
        };
        SearchEngine::new(fetcher, settings)
    }

    #[test]
    fn test_flat_and_of_two_predicates() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/artist/circle1-all.nozomi", flat(&[5, 3, 1, 2, 3]));
        fetcher.body("ltn.test/tag/comedy-all.nozomi", flat(&[4, 3, 2]));

        let report = engine(fetcher).search(&["a:circle1", "t:comedy"]).unwrap();
        assert_eq!(report.ids, vec![2, 3]);
        assert!(report.warnings.is_empty());
        assert!(!report.aborted);
    }

    #[test]
    fn test_sequential_gives_same_result() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/artist/circle1-all.nozomi", flat(&[1, 2, 3, 5]));
        fetcher.body("ltn.test/tag/comedy-all.nozomi", flat(&[2, 3, 4]));
        let mut e = engine(fetcher);
        e.settings.parallel_predicates = false;
        assert_eq!(e.search(&["a:circle1", "t:comedy"]).unwrap().ids, vec![2, 3]);
    }

    #[test]
    fn test_category_404_degrades_to_empty() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/tag/comedy-all.nozomi", flat(&[2, 3, 4]));
        fetcher.status("ltn.test/artist/gone-all.nozomi", 404);

        let report = engine(fetcher).search(&["agone", "tcomedy"]).unwrap();
        assert!(report.ids.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            SearchWarning::Degraded { token, .. } if token.kind == PredicateKind::Artist
        ));
    }

    #[test]
    fn test_single_predicate_is_sorted_dedup() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/index-korean.nozomi", flat(&[9, 1, 9, 4]));
        let report = engine(fetcher).search(&["lkorean", "?bad"]).unwrap();
        assert_eq!(report.ids, vec![1, 4, 9]);
        assert!(matches!(&report.warnings[0], SearchWarning::Parse(w) if w.token == "?bad"));
    }

    #[test]
    fn test_no_predicates_is_empty() {
        let fetcher = Arc::new(StubFetcher::new());
        let report = engine(fetcher.clone()).search::<&str>(&[]).unwrap();
        assert!(report.ids.is_empty());
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_keyword_index_corrupt_is_hard_error() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/galleriesindex/version", b"9".to_vec());
        let mut subnodes = [0u64; SUBNODE_COUNT];
        subnodes[SUBNODE_COUNT - 1] = 4096;
        // 非叶子根节点，目标 key 落在地址为 0 的槽位
        fetcher.body(
            "ltn.test/galleriesindex/galleries.9.index",
            encode_node(&[(&[0xff, 0xff, 0xff, 0xff], 0, 4)], &subnodes),
        );
        fetcher.body("ltn.test/tag/comedy-all.nozomi", flat(&[1]));

        let err = engine(fetcher).search(&["ktest", "tcomedy"]).unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[test]
    fn test_keyword_format_error_degrades() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/galleriesindex/version", b"9".to_vec());
        // 节点被截断
        fetcher.body("ltn.test/galleriesindex/galleries.9.index", vec![0, 0, 0, 1, 0]);
        let report = engine(fetcher).search(&["ktest"]).unwrap();
        assert!(report.ids.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_polarity_strategy() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/tag/a-all.nozomi", flat(&[1, 2, 3, 4]));
        fetcher.body("ltn.test/tag/b-all.nozomi", flat(&[2]));
        fetcher.body("ltn.test/tag/c-all.nozomi", flat(&[3, 4]));
        fetcher.body("ltn.test/tag/d-all.nozomi", flat(&[4]));
        let e = engine(fetcher).with_strategy(FoldStrategy::Polarity);
        let report = e.search(&["ta", "|tb", "|tc", "~td"]).unwrap();
        assert_eq!(report.ids, vec![2, 3]);
    }

    #[test]
    fn test_canceled_search_reports_aborted() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/tag/a-all.nozomi", flat(&[1]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = engine(fetcher.clone())
            .search_with_cancel(&["ta", "kfoo"], Some(&cancel))
            .unwrap();
        assert!(report.aborted);
        assert!(report.ids.is_empty());
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_search_str_splits_quotes() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/tag/female:sole female-all.nozomi", flat(&[8, 6]));
        let report = engine(fetcher).search_str(r#""t:female:sole female""#).unwrap();
        assert_eq!(report.ids, vec![6, 8]);
    }

    #[tokio::test]
    async fn test_spawn_search_on_blocking_pool() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body("ltn.test/series/s-all.nozomi", flat(&[3, 1]));
        let engine = Arc::new(engine(fetcher));
        let report = engine
            .spawn_search(vec!["ss".to_string()], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ids, vec![1, 3]);
    }
}
