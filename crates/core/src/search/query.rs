//! 查询参数解析与集合运算。

use std::cmp::Ordering;
use std::fmt;

use crate::index::GalleryId;

/// 谓词种类，对应参数首字母 `a g s c w t l k`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    Artist,
    Group,
    Series,
    Character,
    Type,
    Tag,
    Language,
    Keyword,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 8] = [
        PredicateKind::Artist,
        PredicateKind::Group,
        PredicateKind::Series,
        PredicateKind::Character,
        PredicateKind::Type,
        PredicateKind::Tag,
        PredicateKind::Language,
        PredicateKind::Keyword,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_char() == c)
    }

    pub fn as_char(self) -> char {
        match self {
            PredicateKind::Artist => 'a',
            PredicateKind::Group => 'g',
            PredicateKind::Series => 's',
            PredicateKind::Character => 'c',
            PredicateKind::Type => 'w',
            PredicateKind::Tag => 't',
            PredicateKind::Language => 'l',
            PredicateKind::Keyword => 'k',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PredicateKind::Artist => "artist",
            PredicateKind::Group => "group",
            PredicateKind::Series => "series",
            PredicateKind::Character => "character",
            PredicateKind::Type => "type",
            PredicateKind::Tag => "tag",
            PredicateKind::Language => "language",
            PredicateKind::Keyword => "keyword",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            PredicateKind::Artist => "Specify artist.",
            PredicateKind::Group => "Specify group.",
            PredicateKind::Series => "Specify series.",
            PredicateKind::Character => "Specify character.",
            PredicateKind::Type => "Specify type.{doujinshi, artistcg, gamecg, manga}",
            PredicateKind::Tag => "Specify tags.",
            PredicateKind::Language => "Specify language.",
            PredicateKind::Keyword => "Specify keywords.",
        }
    }
}

/// 仅在 [`FoldStrategy::Polarity`] 下生效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Polarity {
    #[default]
    And,
    Or,
    Not,
}

impl Polarity {
    fn from_prefix(c: char) -> Option<Self> {
        match c {
            '&' => Some(Polarity::And),
            '|' => Some(Polarity::Or),
            '~' => Some(Polarity::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryToken {
    pub kind: PredicateKind,
    pub value: String,
    pub polarity: Polarity,
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.polarity {
            Polarity::And => "",
            Polarity::Or => "|",
            Polarity::Not => "~",
        };
        write!(f, "{prefix}{}:{}", self.kind.as_char(), self.value)
    }
}

/// 无法识别的参数，跳过但不中断查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub token: String,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.token, self.message)
    }
}

/// 多个谓词结果的合并方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoldStrategy {
    /// 全部求交
    #[default]
    Flat,
    /// `|` 先并、`&`/无前缀求交、`~` 最后求差
    Polarity,
}

/// 解析参数列表。
///
/// 首字符选择谓词种类，其后紧跟取值；取值前可带一个 `:` 分隔符，`_` 视为空格。
/// `polarity` 为真时允许首字符前再加 `~` `|` `&`。
pub fn parse_tokens<S: AsRef<str>>(
    args: &[S],
    polarity: bool,
) -> (Vec<QueryToken>, Vec<ParseWarning>) {
    let mut tokens = Vec::new();
    let mut warnings = Vec::new();

    for arg in args {
        let raw = arg.as_ref();
        if raw.is_empty() {
            continue;
        }
        let mut chars = raw.chars();
        let mut head = chars.next();

        let mut pol = Polarity::And;
        if polarity {
            if let Some(p) = head.and_then(Polarity::from_prefix) {
                pol = p;
                head = chars.next();
            }
        }

        let Some(kind) = head.and_then(PredicateKind::from_char) else {
            warnings.push(ParseWarning {
                token: raw.to_string(),
                message: "invalid argument: unknown predicate kind".to_string(),
            });
            continue;
        };

        let rest = chars.as_str();
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        if rest.is_empty() {
            warnings.push(ParseWarning {
                token: raw.to_string(),
                message: format!("empty {} value", kind.name()),
            });
            continue;
        }
        let value = rest.replace('_', " ");

        tokens.push(QueryToken {
            kind,
            value,
            polarity: pol,
        });
    }

    (tokens, warnings)
}

/// 按 shell 规则切分：空白分隔，支持单双引号与反斜杠转义。
pub fn split_like_shell(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        out.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        out.push(current);
    }
    out
}

pub fn intersect_sorted(a: &[GalleryId], b: &[GalleryId]) -> Vec<GalleryId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

pub fn union_sorted(a: &[GalleryId], b: &[GalleryId]) -> Vec<GalleryId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

pub fn difference_sorted(a: &[GalleryId], b: &[GalleryId]) -> Vec<GalleryId> {
    let mut out = Vec::with_capacity(a.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() {
        if j >= b.len() {
            out.extend_from_slice(&a[i..]);
            break;
        }
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// 排序去重，供集合运算前使用
pub fn normalize(mut ids: Vec<GalleryId>) -> Vec<GalleryId> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// 合并各谓词的结果（每个列表必须已排序去重）。
pub fn fold(strategy: FoldStrategy, lists: Vec<(Polarity, Vec<GalleryId>)>) -> Vec<GalleryId> {
    let reduce = |lists: Vec<Vec<GalleryId>>, op: fn(&[GalleryId], &[GalleryId]) -> Vec<GalleryId>| {
        let mut iter = lists.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, l| op(&acc, &l)))
    };

    match strategy {
        FoldStrategy::Flat => {
            let all = lists.into_iter().map(|(_, l)| l).collect();
            reduce(all, intersect_sorted).unwrap_or_default()
        }
        FoldStrategy::Polarity => {
            let mut and_lists = Vec::new();
            let mut or_lists = Vec::new();
            let mut not_lists = Vec::new();
            for (polarity, list) in lists {
                match polarity {
                    Polarity::And => and_lists.push(list),
                    Polarity::Or => or_lists.push(list),
                    Polarity::Not => not_lists.push(list),
                }
            }
            if let Some(or_list) = reduce(or_lists, union_sorted) {
                and_lists.push(or_list);
            }
            let Some(base) = reduce(and_lists, intersect_sorted) else {
                return Vec::new();
            };
            not_lists
                .iter()
                .fold(base, |acc, l| difference_sorted(&acc, l))
        }
    }
}
