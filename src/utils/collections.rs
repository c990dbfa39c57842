//! Tiny collection-construction helpers used at a handful of call sites
//! where spelling out the concrete map type would add noise.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// An empty `extra`/context-shaped map, for builders that need a starting
/// point before the caller populates it.
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}
