//! Identity-document verification session core.
//!
//! A session captures a document optically, optionally follows up with a
//! contactless chip read, and presents the extracted identity fields together
//! with an authenticity verdict. The external recognition engine is consumed
//! through [`engine::DocumentEngine`] and [`engine::EventSource`];
//! [`engine::SimulatedEngine`] stands in for it in tests and the CLI.

pub mod authenticity;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;
pub mod results;
pub mod router;
pub mod runtime;
pub mod session;
pub mod settings;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "tauri")]
pub mod commands;

pub use error::{Result, VerifierError};
pub use session::{SessionDriver, SessionHandle, SessionMachine, SessionSnapshot, SessionState};
