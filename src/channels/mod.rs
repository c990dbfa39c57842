//! Versioned channel storage for `RunState`.
//!
//! Each channel owns one slice of run state and maintains a monotonic
//! version counter bumped once per barrier merge that actually changes its
//! contents. Checkpoints persist these counters (`channel_versions`) so a
//! resumed run can detect replay conflicts (§4.2/§8 property 2).

pub mod artifacts;
pub mod errors;
pub mod extras;
pub mod messages;
pub mod stage_outputs;
pub mod token_usage;

pub use artifacts::ArtifactsChannel;
pub use errors::{ErrorEvent, ErrorsChannel};
pub use extras::ExtrasChannel;
pub use messages::MessagesChannel;
pub use stage_outputs::StageOutputsChannel;
pub use token_usage::TokenUsageChannel;

/// Common shape for a versioned channel of state.
///
/// `T` is the channel's snapshot type (what `snapshot()` returns); the
/// channel itself may store data in a different representation internally
/// (e.g. `StageOutputsChannel` stores a fixed-size array but snapshots as a
/// map).
pub trait Channel<T> {
    /// Mutable access to the channel's live data. Only the barrier/reducer
    /// layer should call this outside of construction helpers and tests.
    fn get_mut(&mut self) -> &mut T;

    /// A cloned, read-only view of the channel's current contents.
    fn snapshot(&self) -> T;

    /// The channel's current version. Incremented by `bump_version` whenever
    /// a merge pass actually changes the channel's contents.
    fn version(&self) -> u32;

    /// Manually set the version (used when restoring from a checkpoint).
    fn set_version(&mut self, version: u32);

    /// Increment the version counter by one.
    fn bump_version(&mut self) {
        self.set_version(self.version() + 1);
    }
}
