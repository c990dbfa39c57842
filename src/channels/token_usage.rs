use serde::{Deserialize, Serialize};

use super::Channel;

/// Running total of model token consumption across all stage attempts in a run.
///
/// Merge semantics are additive: each stage attempt reports the tokens it
/// consumed and the reducer sums them in, it never overwrites. `total` is
/// kept as a derived field rather than recomputed on read so a checkpoint
/// snapshot is self-contained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    fn add(&mut self, delta: TokenUsage) {
        self.input += delta.input;
        self.output += delta.output;
        self.total += delta.total;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageChannel {
    data: TokenUsage,
    version: u32,
}

impl TokenUsageChannel {
    #[must_use]
    pub fn new(data: TokenUsage, version: u32) -> Self {
        Self { data, version }
    }

    #[must_use]
    pub fn totals(&self) -> TokenUsage {
        self.data
    }

    pub fn accumulate(&mut self, delta: TokenUsage) {
        self.data.add(delta);
    }
}

impl Channel<TokenUsage> for TokenUsageChannel {
    fn get_mut(&mut self) -> &mut TokenUsage {
        &mut self.data
    }

    fn snapshot(&self) -> TokenUsage {
        self.data
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}
