pub mod chain;
pub mod locks;
pub mod sequencer;
pub mod service;
pub mod state;
pub mod verify;

pub use sequencer::NsrSequencer;
pub use service::{CreatedEntry, IntegrityLedger, RebuildOutcome};
pub use state::ChainState;
pub use verify::IntegrityCheck;
