pub mod bridge;
pub mod field_model;
pub mod messages;
