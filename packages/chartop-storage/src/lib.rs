pub mod connector;
pub mod models;
pub mod postgres;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
