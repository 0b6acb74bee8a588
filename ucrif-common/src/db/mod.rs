//! Database schema, models and record repository

pub mod init;
pub mod models;
pub mod records;
pub mod subrecords;

pub use init::*;
pub use models::*;
pub use records::*;
pub use subrecords::*;
