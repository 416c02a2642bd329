pub mod auth;
pub mod core;
pub mod marks;
pub mod setup;
pub mod upload;
