//! Minimal PDF writer for tabular text reports
//!
//! Produces a PDF 1.4 file using only the built-in Courier fonts, so no
//! font embedding is needed. Pages are A4 landscape; lines longer than a
//! page width are truncated.

use std::fmt::Write as _;

const PAGE_WIDTH: u32 = 842;
const PAGE_HEIGHT: u32 = 595;
const MARGIN: u32 = 40;
const BODY_FONT_SIZE: u32 = 8;
const LEADING: u32 = 11;
const TITLE_FONT_SIZE: u32 = 12;

/// Courier glyphs are 0.6 em wide
pub const MAX_LINE_CHARS: usize =
    ((PAGE_WIDTH - 2 * MARGIN) as usize * 10) / (BODY_FONT_SIZE as usize * 6);

/// Body lines that fit under the title block
pub const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN - 30) / LEADING) as usize;

/// Render `lines` under `title`, paginating as needed. An empty report still
/// produces one page with the title.
pub fn render_text_pdf(title: &str, lines: &[String]) -> Vec<u8> {
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![lines]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    let page_count = pages.len();

    // Object layout: 1 catalog, 2 page tree, 3 body font, 4 title font,
    // then (page, content) pairs.
    let page_obj = |i: usize| 5 + 2 * i;
    let content_obj = |i: usize| 6 + 2 * i;
    let total_objects = 4 + 2 * page_count;

    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::with_capacity(total_objects);

    out.extend_from_slice(b"%PDF-1.4\n");

    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect::<Vec<_>>()
        .join(" ");

    push_object(&mut out, &mut offsets, 1, "<< /Type /Catalog /Pages 2 0 R >>");
    push_object(
        &mut out,
        &mut offsets,
        2,
        &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count),
    );
    push_object(
        &mut out,
        &mut offsets,
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>",
    );
    push_object(
        &mut out,
        &mut offsets,
        4,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (i, page_lines) in pages.iter().enumerate() {
        push_object(
            &mut out,
            &mut offsets,
            page_obj(i),
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH,
                PAGE_HEIGHT,
                content_obj(i)
            ),
        );

        let stream = page_stream(title, page_lines, i + 1, page_count);
        push_object(
            &mut out,
            &mut offsets,
            content_obj(i),
            &format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
        );
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", total_objects + 1);
    for offset in &offsets {
        let _ = writeln!(xref, "{:010} 00000 n ", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        total_objects + 1,
        xref_offset
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

fn push_object(out: &mut Vec<u8>, offsets: &mut Vec<usize>, id: usize, body: &str) {
    debug_assert_eq!(offsets.len() + 1, id, "objects must be written in order");
    offsets.push(out.len());
    out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
}

fn page_stream(title: &str, lines: &[String], page: usize, page_count: usize) -> String {
    let mut s = String::new();
    let title_y = PAGE_HEIGHT - MARGIN;
    let body_y = title_y - 30;

    let _ = writeln!(
        s,
        "BT /F2 {} Tf {} {} Td ({}) Tj ET",
        TITLE_FONT_SIZE,
        MARGIN,
        title_y,
        escape(&format!("{}  (page {}/{})", title, page, page_count))
    );
    let _ = write!(
        s,
        "BT /F1 {} Tf {} TL {} {} Td",
        BODY_FONT_SIZE, LEADING, MARGIN, body_y
    );
    for line in lines {
        let clipped: String = line.chars().take(MAX_LINE_CHARS).collect();
        let _ = write!(s, " ({}) Tj T*", escape(&clipped));
    }
    s.push_str(" ET");
    s
}

/// Escape PDF string delimiters; anything outside printable ASCII becomes '?'
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}
