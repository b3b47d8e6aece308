//! 敏感内容过滤
//!
//! 词表匹配不区分大小写，命中的词按字符替换为等长的 `*`；
//! 正则规则（长数字串、邮箱、链接）命中的片段替换为固定标记。

use std::collections::BTreeSet;

use regex::Regex;

/// 正则命中片段的替换标记
pub const REDACTION_MARKER: &str = "[已过滤]";

const DEFAULT_WORDS: &[&str] = &[
    "fuck", "shit", "damn", "hell", "stupid", "垃圾", "傻逼", "混蛋", "白痴", "蠢货", "废物", "死",
    "杀", "暴力", "恐怖", "血腥", "色情", "政治敏感词",
];

// 长数字串优先于手机号，避免银行卡号只被截断一部分
const DEFAULT_PATTERNS: &[&str] = &[
    r"\d{15,19}",
    r"\d{11}",
    r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
    r"https?://[^\s]+",
];

/// 过滤结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub text: String,
    pub contains_sensitive: bool,
}

/// 纯函数式过滤器，`filter` 只读取词表，可在多线程间共享。
/// 修改词表需要调用方自行同步。
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    words: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl ContentFilter {
    /// 空过滤器，不做任何替换
    pub fn new() -> Self {
        Self::default()
    }

    /// 默认词表 + 默认正则规则
    pub fn with_defaults() -> Self {
        let mut filter = Self::without_patterns();
        filter.patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "skipping invalid filter pattern");
                    None
                }
            })
            .collect();
        filter
    }

    /// 仅默认词表
    pub fn without_patterns() -> Self {
        let mut filter = Self::new();
        for word in DEFAULT_WORDS {
            filter.add_word(word);
        }
        filter
    }

    /// 返回是否新增
    pub fn add_word(&mut self, word: &str) -> bool {
        let normalized = normalize(word);
        if normalized.is_empty() {
            return false;
        }
        self.words.insert(normalized)
    }

    /// 返回是否存在并被移除
    pub fn remove_word(&mut self, word: &str) -> bool {
        self.words.remove(&normalize(word))
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn filter(&self, text: &str) -> FilterOutcome {
        let mut chars: Vec<char> = text.chars().collect();
        let mut folded: Vec<char> = chars.iter().map(|c| fold(*c)).collect();
        let mut contains_sensitive = false;

        for word in &self.words {
            let needle: Vec<char> = word.chars().collect();
            if mask_occurrences(&mut chars, &mut folded, &needle) {
                contains_sensitive = true;
            }
        }

        let mut text: String = chars.into_iter().collect();
        for pattern in &self.patterns {
            if pattern.is_match(&text) {
                contains_sensitive = true;
                text = pattern.replace_all(&text, REDACTION_MARKER).into_owned();
            }
        }

        FilterOutcome {
            text,
            contains_sensitive,
        }
    }
}

fn normalize(word: &str) -> String {
    word.trim().chars().map(fold).collect()
}

fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}

/// 从左到右、不重叠地替换所有命中位置
fn mask_occurrences(chars: &mut [char], folded: &mut [char], needle: &[char]) -> bool {
    if needle.is_empty() || needle.len() > folded.len() {
        return false;
    }
    let mut found = false;
    let mut i = 0;
    while i + needle.len() <= folded.len() {
        if folded[i..i + needle.len()] == *needle {
            for j in i..i + needle.len() {
                chars[j] = '*';
                folded[j] = '*';
            }
            found = true;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}
