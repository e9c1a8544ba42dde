pub mod document;
pub mod locators;
pub mod record;

pub use document::{PageDocument, page_path};
pub use record::ProductRecord;

use document::{element_attr, element_text};
use scraper::{ElementRef, Selector};
use std::collections::BTreeMap;

/// True when the page path carries one of the product-detail markers.
///
/// Callers are expected to check this before extracting; off product pages
/// the capture flow is skipped entirely.
pub fn is_product_page(path: &str) -> bool {
    locators::PRODUCT_PATH_MARKERS
        .iter()
        .any(|marker| path.contains(marker))
}

/// Extract a normalized product record from a rendered page.
///
/// Every field degrades independently: a missing element yields `None` (or an
/// empty collection) and extraction continues. The returned record always has
/// the complete shape; the only signal a caller must inspect beforehand is
/// [`is_product_page`].
pub fn extract(doc: &PageDocument) -> ProductRecord {
    ProductRecord {
        title: first_text(doc, locators::TITLE.iter()),
        price: resolve_price(doc),
        currency: doc.text(&locators::PRICE_SYMBOL),
        rating: first_text(doc, locators::RATING.iter()),
        review_count: first_text(doc, locators::REVIEW_COUNT.iter()),
        asin: resolve_asin(doc),
        description: first_text(doc, locators::DESCRIPTION.iter())
            .or_else(|| first_text(doc, locators::TITLE.iter())),
        brand: first_text(doc, locators::BRAND.iter()),
        images: collect_gallery(doc),
        main_image: resolve_main_image(doc),
        availability: first_text(doc, locators::AVAILABILITY.iter()),
        product_details: collect_details(doc),
        breadcrumbs: collect_breadcrumbs(doc),
        url: doc.address().to_string(),
        is_product_page: is_product_page(doc.path()),
    }
}

/// First non-empty trimmed text across an ordered candidate chain.
fn first_text<'a>(
    doc: &PageDocument,
    mut chain: impl Iterator<Item = &'a Selector>,
) -> Option<String> {
    chain.find_map(|candidate| doc.text(candidate))
}

/// Whole and fractional display parts concatenated as strings. The page's own
/// formatting is preserved; no numeric parsing. A missing whole part yields
/// `None` regardless of the fraction.
fn resolve_price(doc: &PageDocument) -> Option<String> {
    let whole = doc.text(&locators::PRICE_WHOLE)?;
    let fraction = doc.text(&locators::PRICE_FRACTION).unwrap_or_default();
    Some(format!("{whole}{fraction}"))
}

fn resolve_asin(doc: &PageDocument) -> Option<String> {
    if let Some(value) = doc.attr(&locators::ASIN_FIELD, "value") {
        return Some(value);
    }
    locators::ASIN_IN_PATH
        .captures(doc.path())
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
}

/// Candidate image elements in priority order; a candidate is accepted only
/// when its resolved URL carries a recognized scheme. The high-resolution
/// data attribute is the last resort.
fn resolve_main_image(doc: &PageDocument) -> Option<String> {
    for candidate in locators::MAIN_IMAGE.iter() {
        if let Some(element) = doc.find(candidate)
            && let Some(source) = image_source(&element)
            && source.starts_with("http")
        {
            return Some(canonicalize_image_url(&source));
        }
    }
    doc.attr(&locators::MAIN_IMAGE_HIRES, locators::MAIN_IMAGE_HIRES_ATTR)
        .map(|source| canonicalize_image_url(&source))
}

/// Strip the host's size-variant suffix so the unscaled asset is requested.
/// URLs without the delimiter pass through unchanged.
pub(crate) fn canonicalize_image_url(url: &str) -> String {
    match url.find(locators::IMAGE_VARIANT_DELIMITER) {
        Some(index) => format!("{}{}", &url[..index], locators::IMAGE_NORMALIZED_EXT),
        None => url.to_string(),
    }
}

fn image_source(element: &ElementRef<'_>) -> Option<String> {
    element_attr(element, "src").or_else(|| element_attr(element, "data-src"))
}

/// Gallery images in document order. Placeholder assets are filtered out;
/// duplicates are kept as encountered.
fn collect_gallery(doc: &PageDocument) -> Vec<String> {
    doc.find_all(&locators::GALLERY_IMAGES)
        .filter_map(|element| image_source(&element))
        .filter(|source| !source.contains(locators::IMAGE_PLACEHOLDER_MARKER))
        .collect()
}

/// Label/value rows from the specification table or detail bullet list. Rows
/// missing either side are skipped rather than stored with a blank.
fn collect_details(doc: &PageDocument) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    for row in doc.find_all(&locators::DETAIL_ROWS) {
        let label = row
            .select(&locators::DETAIL_LABEL)
            .next()
            .and_then(|element| element_text(&element));
        let value = row
            .select(&locators::DETAIL_VALUE)
            .next()
            .and_then(|element| element_text(&element));
        if let (Some(label), Some(value)) = (label, value) {
            details.insert(normalize_detail_key(&label), value);
        }
    }
    details
}

/// Whitespace runs collapse to a single underscore, colons are stripped.
pub(crate) fn normalize_detail_key(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(':', "")
}

fn collect_breadcrumbs(doc: &PageDocument) -> Vec<String> {
    doc.find_all(&locators::BREADCRUMBS)
        .filter_map(|element| element_text(&element))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_URL: &str = "https://www.example-retail.com/dp/B0TESTASIN?ref=nav";

    fn product_page() -> &'static str {
        r##"<html><body>
        <div id="wayfinding-breadcrumbs_feature_div">
            <a href="/home">Home &amp; Kitchen</a>
            <a href="/lighting">Lighting</a>
            <a href="/lamps">Table Lamps</a>
        </div>
        <span id="productTitle">  Warm Glow Desk Lamp  </span>
        <span id="title">Short Title</span>
        <span class="a-price-symbol">$</span>
        <span class="a-price-whole">29.</span>
        <span class="a-price-fraction">99</span>
        <span data-hook="rating-out-of-text">4.5 out of 5</span>
        <span class="a-icon-alt">4.5 out of 5 stars</span>
        <span id="acrCustomerReviewText">1,204 ratings</span>
        <input name="ASIN" value="B0FORMASIN"/>
        <div id="feature-bullets">
            <ul><li>Adjustable arm</li><li>Warm LED</li></ul>
        </div>
        <div id="productDescription">A lamp described at length.</div>
        <a id="bylineInfo">Visit the GlowCo Store</a>
        <div id="imageBlock">
            <img id="landingImage"
                 src="https://img.example-cdn.com/images/I/71lamp._AC_SX679_.jpg"
                 data-old-hires="https://img.example-cdn.com/images/I/71lamp-full.jpg"/>
            <img src="https://img.example-cdn.com/images/I/41thumb.jpg"/>
            <img src="https://img.example-cdn.com/sprites/transparent-pixel.gif"/>
        </div>
        <div id="altImages">
            <img data-src="https://img.example-cdn.com/images/I/51alt.jpg"/>
        </div>
        <div id="availability"><span> In Stock </span></div>
        <table id="productDetails_detailBullets_sections1">
            <tr><th>  Item   Weight: </th><td> 1.2 pounds </td></tr>
            <tr><th>Manufacturer</th><td>GlowCo</td></tr>
            <tr><th>Orphan Label</th></tr>
        </table>
        </body></html>"##
    }

    fn extract_from(html: &str, url: &str) -> ProductRecord {
        let doc = PageDocument::parse(html, url);
        extract(&doc)
    }

    #[test]
    fn full_page_resolves_every_field() {
        let record = extract_from(product_page(), PRODUCT_URL);

        assert_eq!(record.title.as_deref(), Some("Warm Glow Desk Lamp"));
        assert_eq!(record.price.as_deref(), Some("29.99"));
        assert_eq!(record.currency.as_deref(), Some("$"));
        assert_eq!(record.review_count.as_deref(), Some("1,204 ratings"));
        assert_eq!(record.asin.as_deref(), Some("B0FORMASIN"));
        assert_eq!(record.brand.as_deref(), Some("Visit the GlowCo Store"));
        assert_eq!(record.availability.as_deref(), Some("In Stock"));
        assert_eq!(record.url, PRODUCT_URL);
        assert!(record.is_product_page);
        assert_eq!(
            record.breadcrumbs,
            vec!["Home & Kitchen", "Lighting", "Table Lamps"]
        );
    }

    #[test]
    fn chained_fields_short_circuit_on_the_first_candidate() {
        let record = extract_from(product_page(), PRODUCT_URL);

        // Both rating locators resolve; the data-hook one wins.
        assert_eq!(record.rating.as_deref(), Some("4.5 out of 5"));
        // Both title locators resolve; #productTitle wins.
        assert_eq!(record.title.as_deref(), Some("Warm Glow Desk Lamp"));
        // Bullet list outranks the generic description block.
        let description = record.description.expect("bullet description");
        assert!(description.starts_with("Adjustable arm"));
        assert!(description.contains("Warm LED"));
        assert!(!description.contains("described at length"));
    }

    #[test]
    fn description_prefers_bullets_then_block_then_title() {
        let bullets_and_block = r##"
            <span id="productTitle">Lamp</span>
            <div id="feature-bullets"><ul><li>First bullet</li></ul></div>
            <div id="productDescription">Long form</div>"##;
        let record = extract_from(bullets_and_block, PRODUCT_URL);
        assert_eq!(record.description.as_deref(), Some("First bullet"));

        let block_only = r##"
            <span id="productTitle">Lamp</span>
            <div id="productDescription">Long form</div>"##;
        let record = extract_from(block_only, PRODUCT_URL);
        assert_eq!(record.description.as_deref(), Some("Long form"));

        let title_only = r##"<span id="productTitle">Lamp</span>"##;
        let record = extract_from(title_only, PRODUCT_URL);
        assert_eq!(record.description.as_deref(), Some("Lamp"));
    }

    #[test]
    fn bare_document_degrades_every_field_to_absent() {
        let record = extract_from("<html><body></body></html>", "https://example.com/search?q=x");

        assert_eq!(record.title, None);
        assert_eq!(record.price, None);
        assert_eq!(record.currency, None);
        assert_eq!(record.rating, None);
        assert_eq!(record.review_count, None);
        assert_eq!(record.asin, None);
        assert_eq!(record.description, None);
        assert_eq!(record.brand, None);
        assert_eq!(record.main_image, None);
        assert_eq!(record.availability, None);
        assert!(record.images.is_empty());
        assert!(record.product_details.is_empty());
        assert!(record.breadcrumbs.is_empty());
        assert!(!record.is_product_page);
    }

    #[test]
    fn blank_elements_yield_none_not_empty_strings() {
        let html = r##"
            <span id="productTitle">   </span>
            <div id="availability"><span>  </span></div>"##;
        let record = extract_from(html, PRODUCT_URL);
        assert_eq!(record.title, None);
        assert_eq!(record.availability, None);
    }

    #[test]
    fn price_requires_the_whole_part() {
        let whole_only = r##"<span class="a-price-whole">42</span>"##;
        let record = extract_from(whole_only, PRODUCT_URL);
        assert_eq!(record.price.as_deref(), Some("42"));

        let fraction_only = r##"
            <span class="a-price-fraction">99</span>
            <span class="a-price-symbol">$</span>"##;
        let record = extract_from(fraction_only, PRODUCT_URL);
        assert_eq!(record.price, None);
        assert_eq!(record.currency.as_deref(), Some("$"));
    }

    #[test]
    fn asin_falls_back_to_the_path_token() {
        let record = extract_from("<html></html>", "https://example.com/dp/B0PATHASIN/ref=x");
        assert_eq!(record.asin.as_deref(), Some("B0PATHASIN"));

        let record = extract_from("<html></html>", "https://example.com/gp/product/lowercase1");
        assert_eq!(record.asin, None);
        assert!(record.is_product_page);
    }

    #[test]
    fn main_image_skips_candidates_without_a_recognized_scheme() {
        let html = r##"
            <img id="landingImage" src="data:image/gif;base64,R0lGOD"/>
            <img id="imgBlkFront" src="https://img.example-cdn.com/images/I/81book._SX342_.jpg"/>"##;
        let record = extract_from(html, PRODUCT_URL);
        assert_eq!(
            record.main_image.as_deref(),
            Some("https://img.example-cdn.com/images/I/81book.jpg")
        );
    }

    #[test]
    fn main_image_falls_back_to_the_high_resolution_attribute() {
        let html = r##"
            <img id="landingImage" src="data:image/gif;base64,R0lGOD"
                 data-old-hires="https://img.example-cdn.com/images/I/91big.jpg"/>"##;
        let record = extract_from(html, PRODUCT_URL);
        assert_eq!(
            record.main_image.as_deref(),
            Some("https://img.example-cdn.com/images/I/91big.jpg")
        );
    }

    #[test]
    fn image_url_canonicalization_strips_the_variant_suffix() {
        assert_eq!(
            canonicalize_image_url("https://img.example-cdn.com/images/I/71x._AC_SL1500_.jpg"),
            "https://img.example-cdn.com/images/I/71x.jpg"
        );
        assert_eq!(
            canonicalize_image_url("https://img.example-cdn.com/images/I/71x.png"),
            "https://img.example-cdn.com/images/I/71x.png"
        );
    }

    #[test]
    fn gallery_keeps_order_and_filters_placeholders() {
        let record = extract_from(product_page(), PRODUCT_URL);
        assert_eq!(
            record.images,
            vec![
                "https://img.example-cdn.com/images/I/71lamp._AC_SX679_.jpg",
                "https://img.example-cdn.com/images/I/41thumb.jpg",
                "https://img.example-cdn.com/images/I/51alt.jpg",
            ]
        );
    }

    #[test]
    fn main_image_is_canonicalized_from_the_first_accepted_candidate() {
        let record = extract_from(product_page(), PRODUCT_URL);
        assert_eq!(
            record.main_image.as_deref(),
            Some("https://img.example-cdn.com/images/I/71lamp.jpg")
        );
    }

    #[test]
    fn detail_rows_need_both_label_and_value() {
        let record = extract_from(product_page(), PRODUCT_URL);
        assert_eq!(
            record.product_details.get("Item_Weight").map(String::as_str),
            Some("1.2 pounds")
        );
        assert_eq!(
            record.product_details.get("Manufacturer").map(String::as_str),
            Some("GlowCo")
        );
        assert!(!record.product_details.contains_key("Orphan_Label"));
    }

    #[test]
    fn detail_keys_collapse_whitespace_and_strip_colons() {
        assert_eq!(normalize_detail_key("  Item   Weight: "), "Item_Weight");
        assert_eq!(normalize_detail_key("Country: of: Origin"), "Country_of_Origin");
    }

    #[test]
    fn page_classification_depends_only_on_path_markers() {
        assert!(is_product_page("/dp/B0TESTASIN"));
        assert!(is_product_page("/gp/product/B0TESTASIN"));
        assert!(!is_product_page("/s/search"));
        assert!(!is_product_page("/"));

        // Independent of field availability.
        let record = extract_from("<html></html>", "https://example.com/gp/product/x");
        assert!(record.is_product_page);
        assert_eq!(record.title, None);
    }
}
