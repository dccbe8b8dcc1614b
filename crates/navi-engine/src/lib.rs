pub mod api;
pub mod config;
pub mod conversation;
pub mod formatter;
pub mod observer;
pub mod orchestrator;

pub use navi_common::models;
pub use navi_common::protocol;
