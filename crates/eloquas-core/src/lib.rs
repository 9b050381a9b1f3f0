// Library root: configuration, data model, persistence and auth primitives
// shared by every other crate in the workspace.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
