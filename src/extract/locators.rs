//! Locator tables for product-page extraction.
//!
//! Chained fields resolve through an ordered candidate list: locators are
//! tried in sequence and the first non-empty resolution wins. Update these
//! tables when the retailer changes its markup; each constant is covered by a
//! fixture test.

use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

fn locator(source: &str) -> Selector {
    Selector::parse(source).unwrap()
}

/// Path segments that mark a product-detail page.
pub const PRODUCT_PATH_MARKERS: [&str; 2] = ["/dp/", "/gp/product/"];

/// Variant-suffix delimiter in hosted image URLs. Everything after the first
/// occurrence selects a scaled rendition rather than the original asset.
pub const IMAGE_VARIANT_DELIMITER: &str = "._";

/// Extension the canonicalized main-image URL is normalized to.
pub const IMAGE_NORMALIZED_EXT: &str = ".jpg";

/// Placeholder asset excluded from the image gallery.
pub const IMAGE_PLACEHOLDER_MARKER: &str = "transparent-pixel";

pub static TITLE: LazyLock<[Selector; 2]> =
    LazyLock::new(|| [locator("#productTitle"), locator("#title")]);

pub static PRICE_WHOLE: LazyLock<Selector> = LazyLock::new(|| locator(".a-price-whole"));

pub static PRICE_FRACTION: LazyLock<Selector> = LazyLock::new(|| locator(".a-price-fraction"));

pub static PRICE_SYMBOL: LazyLock<Selector> = LazyLock::new(|| locator(".a-price-symbol"));

pub static RATING: LazyLock<[Selector; 2]> = LazyLock::new(|| {
    [
        locator("span[data-hook='rating-out-of-text']"),
        locator(".a-icon-alt"),
    ]
});

pub static REVIEW_COUNT: LazyLock<[Selector; 2]> = LazyLock::new(|| {
    [
        locator("#acrCustomerReviewText"),
        locator("span[data-hook='total-review-count']"),
    ]
});

/// Hidden form field carrying the product identifier.
pub static ASIN_FIELD: LazyLock<Selector> = LazyLock::new(|| locator("input[name='ASIN']"));

/// Fallback: fixed-length identifier token inside the page path.
pub static ASIN_IN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/dp/([A-Z0-9]{10})").unwrap());

/// Bullet list first, generic description block second; the extractor falls
/// back to the title when neither resolves.
pub static DESCRIPTION: LazyLock<[Selector; 2]> =
    LazyLock::new(|| [locator("#feature-bullets"), locator("#productDescription")]);

pub static BRAND: LazyLock<[Selector; 2]> =
    LazyLock::new(|| [locator("#bylineInfo"), locator(".po-brand .po-break-word")]);

pub static GALLERY_IMAGES: LazyLock<Selector> =
    LazyLock::new(|| locator("#altImages img, #imageBlock img"));

pub static MAIN_IMAGE: LazyLock<[Selector; 5]> = LazyLock::new(|| {
    [
        locator("#landingImage"),
        locator("#imgBlkFront"),
        locator("#main-image"),
        locator("#ebooksImgBlkFront"),
        locator("#imageBlock img"),
    ]
});

/// Last-resort main-image source: the dedicated high-resolution attribute.
pub static MAIN_IMAGE_HIRES: LazyLock<Selector> = LazyLock::new(|| locator("#landingImage"));

pub const MAIN_IMAGE_HIRES_ATTR: &str = "data-old-hires";

pub static AVAILABILITY: LazyLock<[Selector; 2]> =
    LazyLock::new(|| [locator("#availability span"), locator("#availability")]);

pub static DETAIL_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    locator("#productDetails_detailBullets_sections1 tr, #detailBullets_feature_div li")
});

pub static DETAIL_LABEL: LazyLock<Selector> = LazyLock::new(|| locator("th, .a-text-bold"));

pub static DETAIL_VALUE: LazyLock<Selector> = LazyLock::new(|| locator("td, .a-list-item"));

pub static BREADCRUMBS: LazyLock<Selector> =
    LazyLock::new(|| locator("#wayfinding-breadcrumbs_feature_div a"));
