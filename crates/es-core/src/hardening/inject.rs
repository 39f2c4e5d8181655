//! Placing the shield script first in a document.

use crate::navigation::escape_html;

/// `<script>` element loading the shield from `src`.
pub fn script_tag(src: &str) -> String {
    format!(r#"<script src="{}"></script>"#, escape_html(src))
}

/// Insert `snippet` as the first child of `<head>`.
///
/// Documents without a head get one, right after `<html>` when present,
/// otherwise at the very start.
pub fn inject_into_head(html: &str, snippet: &str) -> String {
    let mut out = String::with_capacity(html.len() + snippet.len() + 16);

    if let Some(at) = find_tag_end(html, "head") {
        out.push_str(&html[..at]);
        out.push_str(snippet);
        out.push_str(&html[at..]);
    } else if let Some(at) = find_tag_end(html, "html") {
        out.push_str(&html[..at]);
        out.push_str("<head>");
        out.push_str(snippet);
        out.push_str("</head>");
        out.push_str(&html[at..]);
    } else {
        out.push_str("<head>");
        out.push_str(snippet);
        out.push_str("</head>");
        out.push_str(html);
    }
    out
}

/// Byte offset just past the first `<tag ...>` opening tag, case-insensitive.
fn find_tag_end(html: &str, tag: &str) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut from = 0;
    while let Some(rel) = bytes[from..].iter().position(|&b| b == b'<') {
        let start = from + rel + 1;
        let name_end = start + tag.len();
        if name_end <= bytes.len()
            && bytes[start..name_end].eq_ignore_ascii_case(tag.as_bytes())
            && bytes
                .get(name_end)
                .is_some_and(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
        {
            let close = bytes[name_end..].iter().position(|&b| b == b'>')?;
            return Some(name_end + close + 1);
        }
        from = start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "<script src=\"/shield.js\"></script>";

    #[test]
    fn goes_first_in_head() {
        let html = "<!DOCTYPE html><html><HEAD lang=\"en\"><script src=\"ad.js\"></script></HEAD><body></body></html>";
        let out = inject_into_head(html, TAG);
        assert_eq!(
            out,
            "<!DOCTYPE html><html><HEAD lang=\"en\"><script src=\"/shield.js\"></script><script src=\"ad.js\"></script></HEAD><body></body></html>"
        );
    }

    #[test]
    fn header_element_is_not_head() {
        let html = "<html><body><header>x</header></body></html>";
        let out = inject_into_head(html, TAG);
        assert!(out.starts_with("<html><head><script src=\"/shield.js\"></script></head><body>"));
    }

    #[test]
    fn bare_fragment() {
        assert_eq!(inject_into_head("<p>x</p>", "S"), "<head>S</head><p>x</p>");
    }

    #[test]
    fn script_tag_escapes_src() {
        assert_eq!(script_tag("/s.js?a=1&b=\"2\""), "<script src=\"/s.js?a=1&amp;b=&quot;2&quot;\"></script>");
    }
}
