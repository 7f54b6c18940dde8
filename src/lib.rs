// Library surface for the session engine; the terminal host in main.rs is a
// thin consumer of it.
pub mod clock;
pub mod config;
pub mod diff;
pub mod error;
pub mod notify;
pub mod passage;
pub mod records;
pub mod runtime;
pub mod scoring;
pub mod session;

pub use error::{EngineError, EngineResult};
pub use session::{Phase, Session, SessionContext};
