//! 图片资源地址：由 GG 快照决定子域名与路径片段。
//!
//! 这里只生成地址，下载本身交给调用方；[`with_route`] 把“失败后刷新 GG 再试”的规则包起来。

use crate::error::{Error, Result};
use crate::fetch::Outcome;
use crate::gg::{parse_hash3, GgSnapshot, GgTable, RetryDecision};
use crate::index::GalleryId;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 原图，扩展名取自文件名
    Original,
    Webp,
    Avif,
}

/// 画廊里的一张图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub gallery_id: GalleryId,
    pub hash: String,
    /// 原始文件名（含扩展名）
    pub name: String,
    pub haswebp: bool,
    pub hasavif: bool,
}

impl ImageFile {
    /// `prefer_alt` 时优先 avif，其次 webp，都没有则回落原图。
    pub fn format(&self, prefer_alt: bool) -> ImageFormat {
        match (prefer_alt, self.hasavif, self.haswebp) {
            (true, true, _) => ImageFormat::Avif,
            (true, false, true) => ImageFormat::Webp,
            _ => ImageFormat::Original,
        }
    }

    /// (最后一位, 倒数第三、二位)
    fn hash_parts(&self) -> Result<(&str, &str)> {
        let hash = self.hash.as_str();
        if hash.len() < 3 || !hash.is_ascii() {
            return Err(Error::InvalidHash(self.hash.clone()));
        }
        let n = hash.len();
        Ok((&hash[n - 1..], &hash[n - 3..n - 1]))
    }

    /// GG 表的查表键
    pub fn hash3(&self) -> Result<String> {
        let (a, b) = self.hash_parts()?;
        Ok(format!("{a}{b}"))
    }

    /// 文件名的基名与扩展名（扩展名含 `.`，没有则为空）
    fn split_name(&self) -> (&str, &str) {
        match self.name.find('.') {
            Some(sep) => self.name.split_at(sep),
            None => (self.name.as_str(), ""),
        }
    }

    /// 保存时使用的文件名：换格式时替换扩展名
    pub fn file_name(&self, prefer_alt: bool) -> String {
        let (base, ext) = self.split_name();
        match self.format(prefer_alt) {
            ImageFormat::Avif => format!("{base}.avif"),
            ImageFormat::Webp => format!("{base}.webp"),
            ImageFormat::Original => format!("{base}{ext}"),
        }
    }

    pub fn referer(&self, settings: &Settings) -> String {
        format!("{}/reader/{}.html", settings.referer, self.gallery_id)
    }

    /// 缩略图不经过 GG 表
    pub fn thumbnail_url(&self, settings: &Settings) -> Result<String> {
        let (a, b) = self.hash_parts()?;
        Ok(format!("{}/{a}/{b}/{}.webp", settings.thumbnail_url, self.hash))
    }

    /// 按快照生成图片地址（不带 scheme，与 [`crate::fetch::Fetcher`] 的约定一致）。
    pub fn image_url(
        &self,
        snapshot: &GgSnapshot,
        settings: &Settings,
        prefer_alt: bool,
    ) -> Result<String> {
        let hash3 = self.hash3()?;
        let flag = snapshot.get_subdomain(&hash3)?;
        let subdomain = if flag { '2' } else { '1' };
        let domain = &settings.asset_domain;
        let path = &snapshot.path;
        let hash = &self.hash;

        let url = match self.format(prefer_alt) {
            ImageFormat::Avif => {
                let num = parse_hash3(&hash3)?;
                format!("a{subdomain}.{domain}/{path}/{num}/{hash}.avif")
            }
            ImageFormat::Webp => {
                let num = parse_hash3(&hash3)?;
                format!("w{subdomain}.{domain}/{path}/{num}/{hash}.webp")
            }
            ImageFormat::Original => {
                let (_, ext) = self.split_name();
                format!("{domain}/images/{path}/{hash3}/{hash}{ext}")
            }
        };
        Ok(url)
    }
}

/// 用当前快照生成地址并交给 `attempt`；失败时按 [`GgTable::refresh_after_failure`]
/// 决定是否换新地址再试一次，第二次的结果原样返回。取消直接返回 `Aborted`。
pub fn with_route<T, F>(
    gg: &GgTable,
    settings: &Settings,
    image: &ImageFile,
    prefer_alt: bool,
    mut attempt: F,
) -> Result<Outcome<T>>
where
    F: FnMut(&str) -> Result<Outcome<T>>,
{
    let seen = gg.snapshot();
    let url = image.image_url(&seen, settings, prefer_alt)?;
    let err = match attempt(&url) {
        Ok(outcome) => return Ok(outcome),
        Err(e) => e,
    };
    tracing::warn!("下载 {} 失败: {err}", image.name);

    match gg.refresh_after_failure(&seen)? {
        RetryDecision::GiveUp => Err(err),
        RetryDecision::Retry => {
            let url = image.image_url(&gg.snapshot(), settings, prefer_alt)?;
            tracing::debug!(url = %url, "GG 表已更新，重试");
            attempt(&url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;
    use crate::gg::SAMPLE_GG;
    use std::sync::Arc;

    const GG_URL: &str = "ltn.test/gg.js";

    fn settings() -> Settings {
        Settings {
            gg_script_url: GG_URL.to_string(),
            ..Settings::default()
        }
    }

    fn image(hash: &str) -> ImageFile {
        ImageFile {
            gallery_id: 42,
            hash: hash.to_string(),
            name: "001.jpg".to_string(),
            haswebp: true,
            hasavif: true,
        }
    }

    fn loaded_table() -> (Arc<StubFetcher>, GgTable) {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.body(GG_URL, SAMPLE_GG.as_bytes().to_vec());
        let gg = GgTable::new(fetcher.clone(), &settings());
        gg.update().unwrap();
        (fetcher, gg)
    }

    #[test]
    fn test_hash3_and_invalid_hash() {
        assert_eq!(image("abc1234ff0").hash3().unwrap(), "0ff");
        assert_eq!(image("123").hash3().unwrap(), "312");
        assert!(matches!(image("ab").hash3(), Err(Error::InvalidHash(_))));
    }

    #[test]
    fn test_format_selection() {
        let mut img = image("1234ff0");
        assert_eq!(img.format(false), ImageFormat::Original);
        assert_eq!(img.format(true), ImageFormat::Avif);
        img.hasavif = false;
        assert_eq!(img.format(true), ImageFormat::Webp);
        assert_eq!(img.file_name(true), "001.webp");
        img.haswebp = false;
        assert_eq!(img.format(true), ImageFormat::Original);
        assert_eq!(img.file_name(true), "001.jpg");
    }

    #[test]
    fn test_image_urls_follow_snapshot() {
        let (_, gg) = loaded_table();
        let s = settings();
        let snap = gg.snapshot();

        // 0ff 在 case 列表里：子域名为 2
        let img = image("1234ff0");
        assert_eq!(
            img.image_url(&snap, &s, true).unwrap(),
            "a2.gold-usergeneratedcontent.net/1712345678/255/1234ff0.avif"
        );
        let webp = ImageFile {
            hasavif: false,
            ..img.clone()
        };
        assert_eq!(
            webp.image_url(&snap, &s, true).unwrap(),
            "w2.gold-usergeneratedcontent.net/1712345678/255/1234ff0.webp"
        );
        assert_eq!(
            img.image_url(&snap, &s, false).unwrap(),
            "gold-usergeneratedcontent.net/images/1712345678/0ff/1234ff0.jpg"
        );

        // 100 不在列表里：子域名为 1
        let other = image("abc0001");
        assert_eq!(
            other.image_url(&snap, &s, true).unwrap(),
            "a1.gold-usergeneratedcontent.net/1712345678/256/abc0001.avif"
        );
    }

    #[test]
    fn test_thumbnail_and_referer() {
        let s = Settings::default();
        let img = image("1234ff0");
        assert_eq!(
            img.thumbnail_url(&s).unwrap(),
            "btn.gold-usergeneratedcontent.net/webpbigtn/0/ff/1234ff0.webp"
        );
        assert_eq!(img.referer(&s), "https://hitomi.la/reader/42.html");
    }

    #[test]
    fn test_with_route_retries_after_gg_change() {
        let (fetcher, gg) = loaded_table();
        let s = settings();
        fetcher.body(GG_URL, SAMPLE_GG.replace("1712345678", "1800000000").into_bytes());

        let mut seen_urls = Vec::new();
        let got = with_route(&gg, &s, &image("1234ff0"), false, |url| {
            seen_urls.push(url.to_string());
            if url.contains("1712345678") {
                Err(Error::Network("HTTP 404".to_string()))
            } else {
                Ok(Outcome::Done(url.len()))
            }
        })
        .unwrap();
        assert!(matches!(got, Outcome::Done(_)));
        assert_eq!(seen_urls.len(), 2);
        assert!(seen_urls[1].contains("1800000000"));
    }

    #[test]
    fn test_with_route_retries_only_once() {
        let (fetcher, gg) = loaded_table();
        let s = settings();
        // 每次失败前 gg.js 都换了内容，刷新总会报告 Changed
        let mut attempts = 0u32;
        let err = with_route(&gg, &s, &image("1234ff0"), false, |_| {
            attempts += 1;
            fetcher.body(
                GG_URL,
                SAMPLE_GG
                    .replace("1712345678", &format!("19000000{attempts:02}"))
                    .into_bytes(),
            );
            Err::<Outcome<()>, _>(Error::Network("HTTP 404".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_with_route_gives_up_when_table_unchanged() {
        let (_, gg) = loaded_table();
        let mut attempts = 0;
        let err = with_route(&gg, &settings(), &image("1234ff0"), false, |_| {
            attempts += 1;
            Err::<Outcome<()>, _>(Error::Network("HTTP 404".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_with_route_passes_abort_through() {
        let (fetcher, gg) = loaded_table();
        let before = fetcher.request_count();
        let got = with_route(&gg, &settings(), &image("1234ff0"), false, |_| {
            Ok::<Outcome<()>, Error>(Outcome::Aborted)
        })
        .unwrap();
        assert_eq!(got, Outcome::Aborted);
        assert_eq!(fetcher.request_count(), before);
    }
}
