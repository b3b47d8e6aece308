use std::sync::{PoisonError, RwLock};

use config::FilterConfig;
use domain::{ContentFilter, FilterOutcome};

/// 可在运行时维护词表的共享过滤器。
/// `filter` 只持有读锁，词表修改在写锁内串行执行。
#[derive(Debug, Default)]
pub struct SharedContentFilter {
    inner: RwLock<ContentFilter>,
}

impl SharedContentFilter {
    pub fn new(filter: ContentFilter) -> Self {
        Self {
            inner: RwLock::new(filter),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        let mut filter = if config.redact_patterns {
            ContentFilter::with_defaults()
        } else {
            ContentFilter::without_patterns()
        };
        for word in &config.extra_words {
            filter.add_word(word);
        }
        tracing::info!(
            words = filter.words().count(),
            patterns = filter.pattern_count(),
            "content filter loaded"
        );
        Self::new(filter)
    }

    pub fn filter(&self, text: &str) -> FilterOutcome {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .filter(text)
    }

    pub fn add_word(&self, word: &str) -> bool {
        let added = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_word(word);
        if added {
            tracing::info!(word, "sensitive word added");
        }
        added
    }

    pub fn remove_word(&self, word: &str) -> bool {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_word(word);
        if removed {
            tracing::info!(word, "sensitive word removed");
        }
        removed
    }

    pub fn words(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .words()
            .map(str::to_owned)
            .collect()
    }
}
