// ABOUTME: Client module for stereospin playback devices
// ABOUTME: Clock sync, scheduled-start audio engine, status machine, session runner

/// Client-side clock synchronization (median-of-5 offset filter)
pub mod clock;
/// Scheduled-start audio engine over cpal
pub mod engine;
/// Session runner driving the engine from coordinator broadcasts
pub mod session;
/// UI status machine
pub mod status;

pub use clock::ClockSync;
pub use engine::{AudioEngine, EngineEvent};
pub use session::{ClientControls, LogTap, MessageTap, SessionClient};
pub use status::{Status, StatusEvent, StatusMachine};
