//! Markdown to HTML for chat clients that render `formatted_body`.

use pulldown_cmark::{html, Options, Parser};

/// Render `markdown` to HTML. Inline HTML (`<br>`, `<font>`, `<pre>`) is
/// passed through untouched.
#[must_use]
pub fn to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_and_links() {
        assert_eq!(
            to_html("**Info:** see [Quick Link](https://example.org)"),
            "<p><strong>Info:</strong> see <a href=\"https://example.org\">Quick Link</a></p>"
        );
    }

    #[test]
    fn test_inline_html_passes_through() {
        let html = to_html("is **<font color=\"#44bb77\">OK</font>** <br>");
        assert!(html.contains("<strong><font color=\"#44bb77\">OK</font></strong>"));
        assert!(html.contains("<br>"));
    }
}
