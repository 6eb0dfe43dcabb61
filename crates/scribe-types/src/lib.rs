pub mod api;
pub mod claims;
pub mod markup;
pub mod models;
pub mod permission;
pub mod validate;
