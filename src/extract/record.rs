use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// Normalized output of a single product-page extraction.
///
/// Scalar fields are `None` when the page carries no usable value; they are
/// never an empty string. Collections are empty rather than absent.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub title: Option<String>,
    /// Whole and fractional display parts concatenated as shown on the page.
    pub price: Option<String>,
    pub currency: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub asin: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub availability: Option<String>,
    #[serde(default)]
    pub product_details: BTreeMap<String, String>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    pub url: String,
    pub is_product_page: bool,
}
