use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Read-only query surface over a rendered product page.
///
/// Wraps the parsed DOM together with the address it was captured from. All
/// lookups tolerate missing elements; callers only ever see `Option`s.
pub struct PageDocument {
    dom: Html,
    address: String,
    path: String,
}

impl PageDocument {
    pub fn parse(html: &str, address: &str) -> Self {
        Self {
            dom: Html::parse_document(html),
            address: address.to_string(),
            path: page_path(address),
        }
    }

    /// The page address exactly as captured.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The path component of the address.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn find(&self, locator: &Selector) -> Option<ElementRef<'_>> {
        self.dom.select(locator).next()
    }

    pub fn find_all<'a>(&'a self, locator: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> {
        self.dom.select(locator)
    }

    /// Trimmed text content of the first match; `None` when absent or blank.
    pub fn text(&self, locator: &Selector) -> Option<String> {
        self.find(locator).and_then(|element| element_text(&element))
    }

    /// Trimmed attribute value of the first match; `None` when absent or blank.
    pub fn attr(&self, locator: &Selector, name: &str) -> Option<String> {
        self.find(locator).and_then(|element| element_attr(&element, name))
    }
}

/// Path component of an address; falls back to the raw input for non-URL
/// strings so marker checks still apply.
pub fn page_path(address: &str) -> String {
    match Url::parse(address) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => address.to_string(),
    }
}

pub fn element_text(element: &ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn element_attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
