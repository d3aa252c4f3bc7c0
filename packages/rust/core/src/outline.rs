//! Templated five-section content outline per group.

use keywordkit_shared::{Outline, OutlineSection};

/// Fixed section headings, in emission order.
pub const SECTION_HEADINGS: [&str; 5] = [
    "Introduction",
    "Key Concepts",
    "Best Practices",
    "Tools & Resources",
    "Conclusion",
];

/// Suffix appended to the capitalized label to form the outline title.
pub const TITLE_SUFFIX: &str = " Content Guide";

/// Number of group items interpolated into the introduction.
const FOCUS_ITEMS: usize = 3;

/// Fill the outline template for `label`.
///
/// Only the introduction depends on the input; the other sections are
/// fixed text.
pub fn synthesize_outline(label: &str, items: &[String]) -> Outline {
    let focus = items
        .iter()
        .take(FOCUS_ITEMS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let bullets: [Vec<String>; 5] = [
        vec![
            format!("What {label} is and why it matters"),
            format!("Focus keywords: {focus}"),
        ],
        vec![
            "Core terminology and definitions".into(),
            "How the pieces fit together".into(),
        ],
        vec![
            "Proven approaches that work".into(),
            "Common pitfalls and how to avoid them".into(),
        ],
        vec![
            "Recommended tools".into(),
            "Further reading and references".into(),
        ],
        vec![
            "Key takeaways".into(),
            "Next steps for readers".into(),
        ],
    ];

    Outline {
        title: format!("{}{TITLE_SUFFIX}", capitalize(label)),
        sections: SECTION_HEADINGS
            .iter()
            .zip(bullets)
            .map(|(heading, bullets)| OutlineSection {
                heading: (*heading).to_string(),
                bullets,
            })
            .collect(),
    }
}

/// Upper-case the first character, leaving the rest untouched.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => {
            let upper: String = c.to_uppercase().collect();
            format!("{upper}{}", chars.as_str())
        }
        None => String::new(),
    }
}
