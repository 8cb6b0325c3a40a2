pub mod migrations;
mod repository;
pub mod schema;

pub use repository::Repository;
pub use schema::MIGRATIONS;
