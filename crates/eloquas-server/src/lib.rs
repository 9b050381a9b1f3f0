// HTTP layer: authentication, route table, handlers and the shared context.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
