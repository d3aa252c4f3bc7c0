//! Seed-table topic classification.
//!
//! Each keyword goes to the first topic (in table order) with a seed that
//! occurs as a substring of the keyword, or a word equal to one of the
//! keyword's alphanumeric tokens. Keywords matching nothing fall back to a
//! `misc-<first char>` bucket.

use std::collections::HashMap;

use tracing::{debug, instrument};

use keywordkit_shared::{Group, Topic, TopicTable};

/// Prefix for fallback group labels.
pub const MISC_PREFIX: &str = "misc-";

/// Assigns keywords to topic groups using a fixed seed vocabulary.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    table: TopicTable,
}

impl TopicClassifier {
    /// Build a classifier over `table`. Seeds and words are lower-cased and
    /// empty ones dropped, since an empty seed would match every keyword.
    pub fn new(table: TopicTable) -> Self {
        let topics = table
            .0
            .into_iter()
            .map(|topic| Topic {
                label: topic.label,
                seeds: sanitize(topic.seeds),
                words: sanitize(topic.words),
            })
            .collect();

        Self {
            table: TopicTable::new(topics),
        }
    }

    /// The (sanitized) vocabulary in use.
    pub fn table(&self) -> &TopicTable {
        &self.table
    }

    /// Index of the first topic whose seeds match `keyword`.
    fn match_topic(&self, keyword: &str) -> Option<usize> {
        self.table.topics().iter().position(|topic| {
            topic.seeds.iter().any(|seed| keyword.contains(seed.as_str()))
                || tokens(keyword).any(|token| topic.words.iter().any(|w| w == token))
        })
    }

    /// Label `keyword` would be assigned to.
    pub fn label_for(&self, keyword: &str) -> String {
        match self.match_topic(keyword) {
            Some(idx) => self.table.topics()[idx].label.clone(),
            None => misc_label(keyword),
        }
    }

    /// Partition `keywords` into groups, largest first.
    ///
    /// Equal-sized groups keep creation order: topics in table order, then
    /// misc buckets in order of their first member.
    #[instrument(skip_all, fields(keywords = keywords.len()))]
    pub fn classify(&self, keywords: &[String]) -> Vec<Group> {
        let mut topic_items: Vec<Vec<String>> = vec![Vec::new(); self.table.topics().len()];
        let mut unmatched: Vec<&String> = Vec::new();

        for keyword in keywords {
            match self.match_topic(keyword) {
                Some(idx) => topic_items[idx].push(keyword.clone()),
                None => unmatched.push(keyword),
            }
        }

        let mut groups: Vec<Group> = self
            .table
            .topics()
            .iter()
            .zip(topic_items)
            .filter(|(_, items)| !items.is_empty())
            .map(|(topic, items)| Group {
                label: topic.label.clone(),
                items,
            })
            .collect();

        // Second pass: first-character buckets
        let mut misc_index: HashMap<String, usize> = HashMap::new();
        for keyword in unmatched {
            let label = misc_label(keyword);
            match misc_index.get(&label) {
                Some(&idx) => groups[idx].items.push(keyword.clone()),
                None => {
                    misc_index.insert(label.clone(), groups.len());
                    groups.push(Group {
                        label,
                        items: vec![keyword.clone()],
                    });
                }
            }
        }

        // `sort_by` is stable, which keeps creation order among ties.
        groups.sort_by(|a, b| b.items.len().cmp(&a.items.len()));

        debug!(
            groups = groups.len(),
            misc_buckets = misc_index.len(),
            "classification complete"
        );

        groups
    }
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::new(TopicTable::default())
    }
}

fn sanitize(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tokens(keyword: &str) -> impl Iterator<Item = &str> {
    keyword
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Fallback label built from the keyword's first character.
pub fn misc_label(keyword: &str) -> String {
    let first: String = keyword.chars().take(1).collect();
    format!("{MISC_PREFIX}{first}")
}
