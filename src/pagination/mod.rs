//! Listing pagination and neighbor-post resolution

mod listing;
mod neighbors;

pub use listing::{
    listing_fields, load_initial_page, load_more, ListingState, LoadMoreOutcome, PostPage,
};
pub use neighbors::{find_adjacent, Adjacent};
