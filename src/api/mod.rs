//! Remote facade: the narrow HTTP contract with the feed backend.

mod client;
mod types;

pub use client::{ApiClient, ApiError};
pub use types::{
    Article, ArticleGroup, Feed, FeedHealth, GroupBy, NotificationMatch, PendingNotifications,
    Stats,
};
