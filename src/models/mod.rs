pub mod listing;
pub mod post;

pub use listing::{ListingCard, ScrollInfo};
pub use post::{ApiResponse, RawPayload, StoredPost};
