pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::RoomAssertion;
#[allow(unused_imports)]
pub use mocks::{JoinAcker, MockHistoryLoader, RecordingRouter, TopicRecorder};
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder, ADA, BOB, GROUP, OTHER_GROUP, SELF_ADDRESS};
