pub mod models;
pub mod registry;
