//! Track catalog.

mod manager;
mod models;

pub use manager::{LibraryManager, TrackCatalog};
pub use models::{Artwork, Track, TrackSource};
