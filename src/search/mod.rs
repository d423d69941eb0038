//! Search pipeline: keyword and natural-language searches over a literature source.

pub mod deep;
pub mod engine;

pub use deep::{DeepQueryError, GeneratedQuery};
pub use engine::{SearchError, SearchRequest, Workspace};
