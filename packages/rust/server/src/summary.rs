//! Chat messages sent back to requesters.

use serde_json::{Value, json};

use keywordkit_shared::BatchRecord;

/// Items shown per group in the summary.
pub const SAMPLE_ITEMS: usize = 10;

/// Shown when a batch fails. Never carries error details.
pub const FAILURE_TEXT: &str =
    "Sorry, processing your keyword batch failed. Please try again.";

pub const USAGE_TEXT: &str = "Please paste keywords after the command. \
     Example: `/keywords ai marketing, content automation, ad optimization`";

pub const ACK_TEXT: &str = "Got it! Processing your keywords, results will follow shortly.";

pub const BUSY_TEXT: &str = "Too many batches in progress right now. Please try again in a minute.";

/// Reply visible only to the requester.
pub fn ephemeral(text: &str) -> Value {
    json!({ "response_type": "ephemeral", "text": text })
}

pub fn failure_message() -> Value {
    ephemeral(FAILURE_TEXT)
}

/// Result summary: counts, a sample of each group, and the report link.
pub fn success_message(record: &BatchRecord, download_url: &str) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "Keyword Batch – Results" }
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Cleaned keywords:* {}", record.keywords.len())
            }
        }),
        json!({ "type": "divider" }),
    ];

    for group in &record.groups {
        let sample = group
            .items
            .iter()
            .take(SAMPLE_ITEMS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let more = if group.items.len() > SAMPLE_ITEMS { " …" } else { "" };
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*{}* – {} items\n`{sample}{more}`",
                    group.label,
                    group.items.len()
                )
            }
        }));
    }

    blocks.push(json!({ "type": "divider" }));
    blocks.push(json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!("📄 *Report:* <{download_url}|Download PDF>")
        }
    }));

    json!({
        "response_type": "in_channel",
        "text": "Keyword batch processed",
        "blocks": blocks,
    })
}
