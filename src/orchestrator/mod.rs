//! The orchestration control loop.
//!
//! The scheduler drives waves strictly in sequence: it spawns every node of
//! a wave concurrently behind an admission gate, then polls the spawned
//! agents until the wave completes, fails, or a session-level policy
//! (budget, wall clock) stops it. The merge coordinator integrates
//! completed branches afterwards.

pub mod gate;
pub mod merge;
pub mod report;
pub mod scheduler;

pub use gate::AdmissionGate;
pub use merge::{merge_completed, MergeOptions, MergeReport};
pub use scheduler::{RunOutcome, WaveOutcome, WaveScheduler};
