// Request handlers grouped by resource.

pub mod admin;
pub mod content;
pub mod outreach;
pub mod prospects;
pub mod research;
