//! HTML parser for extracting item links from listing pages
//!
//! Listing pages mark each item with an anchor matched by the configured
//! record selector (`.cover a.mix_url` by default). Hrefs are usually
//! relative and are resolved against the listing page URL.

use scraper::{Html, Selector};
use url::Url;

/// Extracts item links matched by `selector` from a listing page
///
/// # Link Rules
///
/// - Only elements with an `href` attribute contribute a link
/// - Relative hrefs are resolved against `base_url`
/// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only hrefs are dropped
/// - Non-HTTP(S) results are dropped
/// - Duplicates on the same page are collapsed, first occurrence wins
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The listing page URL
/// * `selector` - CSS selector matching item anchors
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Absolute item URLs in document order
/// * `Err(String)` - The selector could not be parsed
///
/// # Example
///
/// ```
/// use mixtape_archiver::crawler::extract_item_links;
/// use url::Url;
///
/// let html = r#"<div class="cover"><a class="mix_url" href="/dj/summer">Summer</a></div>"#;
/// let base_url = Url::parse("https://example.com/dj/history/1").unwrap();
/// let links = extract_item_links(html, &base_url, ".cover a.mix_url").unwrap();
/// assert_eq!(links, vec!["https://example.com/dj/summer".to_string()]);
/// ```
pub fn extract_item_links(
    html: &str,
    base_url: &Url,
    selector: &str,
) -> Result<Vec<String>, String> {
    let selector = Selector::parse(selector)
        .map_err(|e| format!("Invalid selector '{}': {:?}", selector, e))?;
    let document = Html::parse_document(html);

    let mut links: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_link(href, base_url) {
                if !links.contains(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    Ok(links)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
