//! Artist credit handling.

mod normalizer;

pub use normalizer::normalize_artist_credit;
