//! ID generation for runs, sessions, and checkpoints.
//!
//! Centralized so every identifier in the crate has the same shape
//! (a UUID v4, rendered with `Display`) rather than ad hoc `Uuid::new_v4()`
//! calls scattered through constructors.

use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn generate_run_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    #[must_use]
    pub fn generate_checkpoint_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    #[must_use]
    pub fn generate_subscriber_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let gen = IdGenerator::new();
        assert_ne!(gen.generate_run_id(), gen.generate_run_id());
    }
}
