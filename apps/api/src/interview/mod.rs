//! Interview core: stage progression, task generation and grading, chat
//! sessions and post-interview analysis.
//!
//! Every component that talks to the oracle owns a deterministic fallback,
//! so AI downtime never blocks a candidate or surfaces as an error.

pub mod analysis;
pub mod grading;
pub mod handlers;
pub mod progression;
pub mod questions;
pub mod session;
pub mod tasks;

/// Passing threshold applied to graded tasks across all stages.
pub const PASS_THRESHOLD: i32 = 70;

/// Clips text to at most `max_chars` characters (prompt budget guard;
/// char-based so multi-byte input cannot split a boundary).
pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::clip;

    #[test]
    fn test_clip_shorter_input_unchanged() {
        assert_eq!(clip("short", 500), "short");
    }

    #[test]
    fn test_clip_bounds_long_input() {
        let long = "x".repeat(1200);
        assert_eq!(clip(&long, 500).chars().count(), 500);
    }

    #[test]
    fn test_clip_is_char_safe() {
        let s = "héllo wörld";
        assert_eq!(clip(s, 4), "héll");
    }
}
