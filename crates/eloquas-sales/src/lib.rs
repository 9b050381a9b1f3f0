// Library root: prompt-driven engines, scoring, email composition, job
// signals, the outbound email queue and third-party API clients.

pub mod compose;
pub mod engines;
pub mod integrations;
pub mod queue;
pub mod scoring;
pub mod signals;

pub use engines::{EngineError, Evidence, Generated};
pub use integrations::IntegrationError;
