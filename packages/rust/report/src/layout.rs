//! Page layout: turns a batch into positioned text lines on fixed-size pages.
//!
//! The compositor keeps a vertical cursor. Before every line it checks the
//! cursor against the bottom margin and, if it has crossed it, starts a new
//! page with the cursor back at the top. A line is therefore never placed
//! below the margin.

use std::collections::BTreeMap;

use keywordkit_shared::{BatchId, Group, Outline};

/// Points per centimetre.
pub const CM: f32 = 72.0 / 2.54;

/// Maximum items listed under a group.
pub const MAX_GROUP_ITEMS: usize = 20;

/// Maximum outline headings listed under a group.
pub const MAX_OUTLINE_SECTIONS: usize = 8;

/// Page size and margin, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    /// A4 portrait with 2 cm margins.
    pub const A4: Self = Self {
        width: 21.0 * CM,
        height: 29.7 * CM,
        margin: 2.0 * CM,
    };

    /// Baseline of the first line on a page.
    pub fn top(&self) -> f32 {
        self.height - self.margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

/// Base-14 font faces used by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

/// How a line is drawn and how far it moves the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub font: Font,
    pub size: f32,
    pub indent: f32,
    pub advance: f32,
}

impl LineStyle {
    pub const HEADING: Self = Self {
        font: Font::Bold,
        size: 12.0,
        indent: 0.0,
        advance: 14.0,
    };
    pub const BODY: Self = Self {
        font: Font::Regular,
        size: 10.0,
        indent: 0.0,
        advance: 14.0,
    };
    pub const IDEA_LABEL: Self = Self {
        font: Font::Bold,
        size: 10.0,
        indent: 0.0,
        advance: 12.0,
    };
    pub const IDEA: Self = Self {
        font: Font::Regular,
        size: 10.0,
        indent: 20.0,
        advance: 12.0,
    };
}

/// One positioned line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub font: Font,
    pub size: f32,
    pub x: f32,
    /// Baseline, measured from the bottom of the page.
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub lines: Vec<TextLine>,
}

/// A laid-out report, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub title: String,
    pub geometry: PageGeometry,
    pub pages: Vec<Page>,
}

impl Document {
    /// All lines in reading order.
    pub fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.pages.iter().flat_map(|p| p.lines.iter())
    }
}

// ---------------------------------------------------------------------------
// Compositor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct RenderCursor {
    y: f32,
    page_index: usize,
}

struct Composer {
    geometry: PageGeometry,
    pages: Vec<Page>,
    cursor: RenderCursor,
}

impl Composer {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![Page::default()],
            cursor: RenderCursor {
                y: geometry.top(),
                page_index: 0,
            },
        }
    }

    fn gap(&mut self, points: f32) {
        self.cursor.y -= points;
    }

    fn line(&mut self, text: impl Into<String>, style: LineStyle) {
        if self.cursor.y < self.geometry.margin {
            self.pages.push(Page::default());
            self.cursor = RenderCursor {
                y: self.geometry.top(),
                page_index: self.cursor.page_index + 1,
            };
        }

        self.pages[self.cursor.page_index].lines.push(TextLine {
            text: text.into(),
            font: style.font,
            size: style.size,
            x: self.geometry.margin + style.indent,
            y: self.cursor.y,
        });
        self.cursor.y -= style.advance;
    }

    fn finish(self, title: String) -> Document {
        Document {
            title,
            geometry: self.geometry,
            pages: self.pages,
        }
    }
}

/// Lay out a batch report.
///
/// Group items are capped at [`MAX_GROUP_ITEMS`] and outline headings at
/// [`MAX_OUTLINE_SECTIONS`], silently.
pub fn compose(
    batch_id: &BatchId,
    keywords: &[String],
    groups: &[Group],
    outlines: &BTreeMap<String, Outline>,
    post_ideas: &BTreeMap<String, Vec<String>>,
    geometry: PageGeometry,
) -> Document {
    let mut c = Composer::new(geometry);

    c.line("Keyword Content Report", LineStyle::HEADING);
    c.line(format!("Batch: {batch_id}"), LineStyle::BODY);

    c.gap(6.0);
    c.line("Cleaned Keywords", LineStyle::HEADING);
    for kw in keywords {
        c.line(format!("• {kw}"), LineStyle::BODY);
    }

    c.gap(6.0);
    c.line("Groups", LineStyle::HEADING);
    for group in groups {
        c.line(
            format!("{} ({})", group.label, group.items.len()),
            LineStyle::HEADING,
        );
        for item in group.items.iter().take(MAX_GROUP_ITEMS) {
            c.line(format!("   - {item}"), LineStyle::BODY);
        }

        if let Some(outline) = outlines.get(&group.label) {
            c.line(format!("   Outline: {}", outline.title), LineStyle::BODY);
            for section in outline.sections.iter().take(MAX_OUTLINE_SECTIONS) {
                c.line(format!("     • {}", section.heading), LineStyle::BODY);
            }
        }
    }

    c.gap(10.0);
    c.line("Suggested Post Ideas", LineStyle::HEADING);
    for group in groups {
        let Some(ideas) = post_ideas.get(&group.label).filter(|i| !i.is_empty()) else {
            continue;
        };
        c.line(format!("{}:", group.label), LineStyle::IDEA_LABEL);
        for idea in ideas {
            c.line(format!("• {idea}"), LineStyle::IDEA);
        }
    }

    c.finish(format!("Keyword Report – {batch_id}"))
}
