//! Small HTML helpers shared by the archiver and enrichments.

use scraper::{Html, Selector};
use url::Url;

use archivist_shared::{ArchivistError, Result};

/// Parse a CSS selector, mapping failures to a parse error.
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ArchivistError::parse(format!("selector '{css}': {e}")))
}

/// Whether a MIME type denotes an HTML document.
pub fn is_html(mime: Option<&str>) -> bool {
    mime.is_some_and(|m| m.starts_with("text/html") || m.starts_with("application/xhtml"))
}

/// Page title from `<title>`, falling back to the first `<h1>`.
pub fn page_title(doc: &Html) -> Result<Option<String>> {
    for css in ["title", "h1"] {
        let sel = selector(css)?;
        if let Some(text) = doc
            .select(&sel)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
        {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Content of `<meta name|property="...">`, first match wins.
pub fn meta_content(doc: &Html, name: &str) -> Result<Option<String>> {
    let sel = selector(&format!(r#"meta[name="{name}"], meta[property="{name}"]"#))?;
    Ok(doc
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty()))
}

/// Extract all links from a document, resolved against the base URL.
pub fn extract_links(doc: &Html, base_url: &Url) -> Result<Vec<String>> {
    let link_sel = selector("a[href]")?;
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            // Skip anchors, javascript:, mailto:
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
    }

    Ok(links)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape text for inclusion in HTML.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_title_tag_then_h1() {
        let doc = Html::parse_document(
            "<html><head><title>  Launch\n day </title></head><body><h1>Other</h1></body></html>",
        );
        assert_eq!(page_title(&doc).unwrap().as_deref(), Some("Launch day"));

        let doc = Html::parse_document("<html><body><h1>Only Heading</h1></body></html>");
        assert_eq!(page_title(&doc).unwrap().as_deref(), Some("Only Heading"));

        let doc = Html::parse_document("<html><body><p>none</p></body></html>");
        assert_eq!(page_title(&doc).unwrap(), None);
    }

    #[test]
    fn meta_by_name_or_property() {
        let doc = Html::parse_document(
            r#"<html><head>
                <meta name="description" content="A post">
                <meta property="og:image" content="https://cdn.example.com/a.jpg">
            </head></html>"#,
        );
        assert_eq!(meta_content(&doc, "description").unwrap().as_deref(), Some("A post"));
        assert_eq!(
            meta_content(&doc, "og:image").unwrap().as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(meta_content(&doc, "og:title").unwrap(), None);
    }

    #[test]
    fn links_are_resolved_without_anchors() {
        let html = r##"<html><body><a href="/page2">Page 2</a><a href="https://external.com">External</a><a href="#section">Anchor</a><a href="relative/path">Relative</a></body></html>"##;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links = extract_links(&doc, &base).unwrap();

        assert!(links.contains(&"https://docs.example.com/page2".to_string()));
        assert!(links.contains(&"https://external.com/".to_string()));
        assert!(links.contains(&"https://docs.example.com/relative/path".to_string()));
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
