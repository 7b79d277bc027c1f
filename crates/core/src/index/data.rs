use super::reader::ByteReader;
use super::tree::IndexLocation;
use super::{GalleryId, Range};
use crate::error::{Error, Result};
use crate::fetch::{ready, FetchOptions, Fetcher, Outcome};

/// 单个 id 列表声明数量上限，防止被异常长度字段撑爆内存
pub const MAX_GALLERY_IDS: u32 = 10_000_000;

/// `u32 count; count × u32 id`，长度必须严格等于 `4 + 4 * count`。
pub fn decode_id_list(bytes: &[u8]) -> Result<Vec<GalleryId>> {
    let mut arr = ByteReader::new(bytes);
    let number_of_galleryids = arr.read_u32_be()?;
    if number_of_galleryids > MAX_GALLERY_IDS {
        return Err(Error::Format(format!(
            "too many galleryids: {number_of_galleryids}"
        )));
    }
    let expected = 4 + 4 * number_of_galleryids as usize;
    if bytes.len() != expected {
        return Err(Error::Format(format!(
            "mismatched data length: expected {expected}, got {}",
            bytes.len()
        )));
    }

    let mut ids = Vec::with_capacity(number_of_galleryids as usize);
    for _ in 0..number_of_galleryids {
        ids.push(arr.read_u32_be()?);
    }
    Ok(ids)
}

/// 按区间从 `.data` 文件取回 id 列表，保持服务器返回顺序。
pub fn fetch_ids_with_range(
    fetcher: &dyn Fetcher,
    location: &IndexLocation<'_>,
    range: Range,
    options: &FetchOptions<'_>,
) -> Result<Outcome<Vec<GalleryId>>> {
    let opts = FetchOptions {
        range: Some(range),
        ..*options
    };
    let bytes = ready!(fetcher.fetch(&location.data_url(), &opts)?);
    Ok(Outcome::Done(decode_id_list(&bytes)?))
}

#[cfg(test)]
pub(crate) fn encode_id_list(ids: &[GalleryId]) -> Vec<u8> {
    let mut out = (ids.len() as u32).to_be_bytes().to_vec();
    for id in ids {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out
}
