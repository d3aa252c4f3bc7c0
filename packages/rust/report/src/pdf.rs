//! Minimal PDF 1.4 serializer for laid-out documents.
//!
//! Uses the base-14 Helvetica faces with WinAnsi encoding, so nothing is
//! embedded. Content streams are uncompressed and no timestamps are
//! written: identical documents serialize to identical bytes.

use std::fmt::Write as _;

use crate::layout::{Document, Font, Page, PageGeometry};

/// Object numbers of the fixed objects; page objects follow.
const CATALOG_OBJ: usize = 1;
const PAGES_OBJ: usize = 2;
const REGULAR_FONT_OBJ: usize = 3;
const BOLD_FONT_OBJ: usize = 4;
const INFO_OBJ: usize = 5;
const FIRST_PAGE_OBJ: usize = 6;

/// Serialize `doc` to PDF bytes.
pub fn write_pdf(doc: &Document) -> Vec<u8> {
    let mut out = PdfBuffer::default();
    out.raw(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let page_refs = (0..doc.pages.len())
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect::<Vec<_>>()
        .join(" ");

    out.object(
        CATALOG_OBJ,
        format!("<< /Type /Catalog /Pages {PAGES_OBJ} 0 R >>").as_bytes(),
    );
    out.object(
        PAGES_OBJ,
        format!(
            "<< /Type /Pages /Kids [{page_refs}] /Count {} >>",
            doc.pages.len()
        )
        .as_bytes(),
    );
    out.object(REGULAR_FONT_OBJ, font_dict("Helvetica").as_bytes());
    out.object(BOLD_FONT_OBJ, font_dict("Helvetica-Bold").as_bytes());
    out.object(
        INFO_OBJ,
        format!(
            "<< /Title {} /Producer (KeywordKit) >>",
            utf16_hex_string(&doc.title)
        )
        .as_bytes(),
    );

    for (i, page) in doc.pages.iter().enumerate() {
        let content = page_content(page);
        out.object(page_obj(i), page_dict(&doc.geometry, content_obj(i)).as_bytes());

        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(&content);
        stream.extend_from_slice(b"\nendstream");
        out.object(content_obj(i), &stream);
    }

    out.finish()
}

fn page_obj(index: usize) -> usize {
    FIRST_PAGE_OBJ + index * 2
}

fn content_obj(index: usize) -> usize {
    FIRST_PAGE_OBJ + index * 2 + 1
}

fn font_dict(base_font: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base_font} /Encoding /WinAnsiEncoding >>")
}

fn page_dict(geometry: &PageGeometry, contents: usize) -> String {
    format!(
        "<< /Type /Page /Parent {PAGES_OBJ} 0 R /MediaBox [0 0 {:.2} {:.2}] \
         /Resources << /Font << /F1 {REGULAR_FONT_OBJ} 0 R /F2 {BOLD_FONT_OBJ} 0 R >> >> \
         /Contents {contents} 0 R >>",
        geometry.width, geometry.height
    )
}

/// Text-drawing operators for one page.
fn page_content(page: &Page) -> Vec<u8> {
    let mut content = Vec::new();
    for line in &page.lines {
        let font = match line.font {
            Font::Regular => "F1",
            Font::Bold => "F2",
        };
        let mut ops = String::new();
        let _ = write!(
            ops,
            "BT /{font} {:.1} Tf {:.2} {:.2} Td (",
            line.size, line.x, line.y
        );
        content.extend_from_slice(ops.as_bytes());
        content.extend_from_slice(&escape_literal(&encode_win_ansi(&line.text)));
        content.extend_from_slice(b") Tj ET\n");
    }
    content
}

/// Object bodies plus the byte offsets needed for the xref table.
#[derive(Default)]
struct PdfBuffer {
    bytes: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl PdfBuffer {
    fn raw(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    fn object(&mut self, number: usize, body: &[u8]) {
        self.offsets.push((number, self.bytes.len()));
        self.raw(format!("{number} 0 obj\n").as_bytes());
        self.raw(body);
        self.raw(b"\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        self.offsets.sort_by_key(|(number, _)| *number);
        let size = self.offsets.len() + 1;
        let xref_offset = self.bytes.len();

        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for (_, offset) in &self.offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {CATALOG_OBJ} 0 R /Info {INFO_OBJ} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );
        self.raw(xref.as_bytes());
        self.bytes
    }
}

/// Map text to WinAnsi bytes. Tabs become spaces; anything without a
/// WinAnsi code point becomes `?`.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

/// Escape bytes for a PDF literal string.
fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Encode a document-info string as UTF-16BE hex with a byte-order mark.
fn utf16_hex_string(text: &str) -> String {
    let mut hex = String::from("<FEFF");
    for unit in text.encode_utf16() {
        let _ = write!(hex, "{unit:04X}");
    }
    hex.push('>');
    hex
}
