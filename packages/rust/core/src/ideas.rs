//! Templated post suggestions per group.
//!
//! The first five items each get one idea, cycling through three templates;
//! a closing idea about the group as a whole follows.

use crate::outline::capitalize;

/// Maximum number of items that receive their own idea.
const MAX_ITEM_IDEAS: usize = 5;

/// Count used by the listicle template.
const MISTAKE_COUNT: usize = 5;

/// Generate post ideas for a group. Empty `items` produce no ideas.
pub fn generate_post_ideas(label: &str, items: &[String]) -> Vec<String> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut ideas: Vec<String> = items
        .iter()
        .take(MAX_ITEM_IDEAS)
        .enumerate()
        .map(|(i, item)| match i % 3 {
            0 => format!("A beginner's guide to {item}"),
            1 => format!("{MISTAKE_COUNT} common mistakes to avoid with {item}"),
            _ => format!("How {item} fits into your {label} strategy"),
        })
        .collect();

    ideas.push(format!("{} trends to watch this year", capitalize(label)));
    ideas
}
