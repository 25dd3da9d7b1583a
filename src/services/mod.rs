pub mod flatten;
pub mod listing_page;
pub mod post_api;
pub mod store;

pub use listing_page::{ListingPage, ListingSource};
pub use post_api::{ApiSession, PostFetcher};
pub use store::{PostStore, SqlitePostStore, UpsertOutcome, Verdict};
