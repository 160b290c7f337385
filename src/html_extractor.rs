//! HTML extraction boundary (§4.9 step 1, §1 scope note: "HTML parsing ...
//! C9 depends on this through a narrow `HtmlExtractor` trait boundary,
//! never implements a parser").

use scraper::{Html, Selector};
use url::Url;

use crate::error::{Error, Result};

/// Extracts hrefs matching `selector` from `html`, resolved against
/// `base_url`. CSS by default; a selector starting with `/` or `//` is
/// recognized as XPath and rejected with a clear error rather than
/// silently mis-parsed as CSS (§4.9 step 1) — XPath evaluation itself is
/// out of this core's scope.
pub trait HtmlExtractor: Send + Sync {
    fn extract_links(&self, html: &str, selector: &str, base_url: &Url) -> Result<Vec<String>>;
}

/// Default `scraper`-backed CSS extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssExtractor;

impl HtmlExtractor for CssExtractor {
    fn extract_links(&self, html: &str, selector: &str, base_url: &Url) -> Result<Vec<String>> {
        if selector.starts_with('/') {
            return Err(Error::Validation(format!(
                "XPath selector '{selector}' is not supported by the default extractor"
            )));
        }

        let parsed = Selector::parse(selector)
            .map_err(|e| Error::Validation(format!("invalid CSS selector '{selector}': {e:?}")))?;
        let document = Html::parse_document(html);

        let mut urls = Vec::new();
        for element in document.select(&parsed) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if let Ok(resolved) = base_url.join(href) {
                urls.push(resolved.to_string());
            }
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_relative_links() {
        let html = r#"<html><body>
            <ul class="items">
                <li><a href="/detail/1">one</a></li>
                <li><a href="https://other.example.com/detail/2">two</a></li>
                <li><span>no link here</span></li>
            </ul>
        </body></html>"#;
        let base = Url::parse("https://example.com/list").unwrap();
        let urls = CssExtractor.extract_links(html, ".items a", &base).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/detail/1".to_string(),
                "https://other.example.com/detail/2".to_string(),
            ]
        );
    }

    #[test]
    fn rejects_xpath_selectors() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(CssExtractor
            .extract_links("<html></html>", "//a[@class='detail']", &base)
            .is_err());
        assert!(CssExtractor
            .extract_links("<html></html>", "/html/body/a", &base)
            .is_err());
    }

    #[test]
    fn invalid_css_selector_is_rejected() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(CssExtractor
            .extract_links("<html></html>", ":::not-a-selector", &base)
            .is_err());
    }

    #[test]
    fn empty_match_yields_empty_vec() {
        let base = Url::parse("https://example.com/").unwrap();
        let urls = CssExtractor
            .extract_links("<html><body>no links</body></html>", ".detail_urls a", &base)
            .unwrap();
        assert!(urls.is_empty());
    }
}
