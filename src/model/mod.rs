//! Schema model: the typed, read-only graph a diff run compares

mod database_model;
mod dependents;
mod elements;
mod similarity;

pub use database_model::{bracket, index_key_column, DatabaseModel, ModelRef};
pub use dependents::{references_of, resolved_ids, DependencyIndex};
pub use elements::*;
pub use similarity::is_similar;
