use std::collections::HashSet;

use pulldown_cmark::{Parser, html};

const POST_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "pre", "strong",
    "ul", "h1", "h2", "h3", "p",
];

const COMMENT_TAGS: &[&str] = &["a", "abbr", "acronym", "b", "code", "em", "i", "strong"];

/// Markdown post body to sanitized HTML.
pub fn render_post_body(body: &str) -> String {
    render(body, POST_TAGS)
}

/// Markdown comment body to sanitized HTML. Comments get a narrower tag set.
pub fn render_comment_body(body: &str) -> String {
    render(body, COMMENT_TAGS)
}

fn render(body: &str, tags: &[&'static str]) -> String {
    let mut raw = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut raw, Parser::new(body));

    let allowed: HashSet<&str> = tags.iter().copied().collect();
    ammonia::Builder::default()
        .tags(allowed)
        .clean(&raw)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_keeps_headings_and_emphasis() {
        let html = render_post_body("# Title\n\nSome **bold** text\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<p>"));
    }

    #[test]
    fn script_is_removed() {
        let html = render_post_body("hello\n\n<script>alert('x')</script>\n");
        assert!(html.contains("hello"));
        assert!(!html.contains("script"));
        assert!(!html.contains("alert"));
    }

    #[test]
    fn comment_strips_block_tags_but_keeps_text() {
        let html = render_comment_body("# Heading\n\n*soft*");
        assert!(!html.contains("<h1>"));
        assert!(!html.contains("<p>"));
        assert!(html.contains("Heading"));
        assert!(html.contains("<em>soft</em>"));
    }

    #[test]
    fn links_survive() {
        let html = render_comment_body("[site](https://example.com)");
        assert!(html.contains("href=\"https://example.com\""));
    }
}
