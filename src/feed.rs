//! Discovery feed retrieval, normalisation, and search indexing.

pub mod index;
pub mod model;
pub mod parser;
pub mod retry;
pub mod source;
