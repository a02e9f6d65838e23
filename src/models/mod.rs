pub mod context;
pub mod query;
pub mod result;
pub mod table;
