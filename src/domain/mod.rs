pub mod consolidation;
pub mod models;
