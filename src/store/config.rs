use once_cell::sync::Lazy;
use std::env;

/// Base URL of the remote wishlist backend, `/api` root included.
pub static ROOT: Lazy<String> = Lazy::new(|| {
    env::var("WISHLIST_STORE_URL")
        .unwrap_or_else(|_| "http://localhost:8000/api".to_string())
        .trim_end_matches('/')
        .to_string()
});
