pub mod formatter;
pub mod models;
pub mod protocol;
