//! Verification session: state record, state machine, and the driver task
//! that owns them.

pub mod driver;
pub mod machine;
pub mod state;

#[cfg(test)]
mod integration_tests;

pub use driver::{SessionDriver, SessionHandle, SessionTask};
pub use machine::{EventDisposition, SessionConfig, SessionMachine};
pub use state::{
    ChipOption, ChipPhase, ChipStatusLine, ErrorInfo, ErrorStage, SessionSnapshot, SessionState,
    SessionStatus, StatusTone,
};
