pub mod models;
pub mod prompt;

pub use models::{SwipeFeedback, SwipeStats, WishlistInsight, WishlistItem};
pub use prompt::{compile, encouragement_insight};
