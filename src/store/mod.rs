//! Client for the remote wishlist backend. One module per backend concept;
//! every call is a single JSON POST and the backend signals domain failures
//! through an `error` field rather than status codes.

pub mod auth;
pub mod config;
pub mod items;
pub mod swipes;

pub use auth::UserRef;
pub use items::{ItemReceipt, ItemSubmission};
