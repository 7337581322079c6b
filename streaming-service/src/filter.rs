use skyfeed_core::{FeedItem, FilterConfig};
use std::collections::BTreeSet;

/// Author allow-list and keyword requirement, prepared once per run so the
/// keywords are lower-cased a single time.
#[derive(Debug, Clone)]
pub struct FilterEvaluator {
    authors: BTreeSet<String>,
    keywords: Vec<String>,
}

impl FilterEvaluator {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            authors: config.authors.clone(),
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, item: &FeedItem) -> bool {
        if !self.authors.is_empty() && !self.authors.contains(&item.author_handle) {
            return false;
        }

        if !self.keywords.is_empty() {
            if item.text.is_empty() {
                return false;
            }
            let text = item.text.to_lowercase();
            if !self.keywords.iter().any(|keyword| text.contains(keyword.as_str())) {
                return false;
            }
        }

        true
    }
}

pub fn matches(item: &FeedItem, config: &FilterConfig) -> bool {
    FilterEvaluator::new(config).matches(item)
}
