mod articles;
mod schema;
mod sources;
mod types;

pub use schema::Database;
pub use types::{Article, DatabaseError, SeedSource, Source};
