//! Environment knobs, read at pass-construction and compile time.

use std::env;

fn flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => false,
    }
}

/// `KILN_DISABLE_MEMORY_COLORING=1` swaps the live-range planner for the
/// sequential allocation eliminator.
pub fn memory_coloring_disabled() -> bool {
    flag("KILN_DISABLE_MEMORY_COLORING")
}

/// `KILN_PASS_STATS=1` prints one line per executed pass.
pub fn pass_stats_enabled() -> bool {
    flag("KILN_PASS_STATS")
}
