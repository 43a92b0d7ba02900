pub mod calculations;
pub mod db;
pub mod ids;
pub mod models;
pub mod records;
pub mod utils;

pub use db::repository::{RepositoryError, TaxRepository};
pub use models::*;
