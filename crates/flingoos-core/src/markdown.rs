//! Sanitization for workflow markdown before it reaches the browser.
//!
//! The guide text is rendered client-side by a markdown library. Escaping raw
//! HTML here means the renderer can only produce markup from markdown syntax,
//! never from HTML embedded in the upstream payload.

/// Escape raw HTML in markdown source. Markdown syntax itself is untouched.
pub fn sanitize_markdown(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for ch in source.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
