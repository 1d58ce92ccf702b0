pub mod backend;
pub mod config;
pub mod episodes;
pub mod error;
pub mod models;
pub mod store;
