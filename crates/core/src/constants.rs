//! Engine-wide constants.

/// Maximum number of polling rounds the aggregate poller runs before giving up.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 10;

/// Delay between two polling rounds, in milliseconds.
pub const DEFAULT_POLL_DELAY_MS: u64 = 1_500;

/// Lifetime of a cached player aggregate, in seconds (5 minutes).
pub const DEFAULT_AGGREGATE_TTL_SECS: u64 = 5 * 60;

/// Capacity of the store change feed. Slow watchers that fall further behind
/// than this simply re-read the current value.
pub const SECTION_CHANGE_FEED_CAPACITY: usize = 256;

/// Placeholder shown for text fields the backend did not provide.
pub const DISPLAY_PLACEHOLDER: &str = "N/A";

/// Message used when a backend error carries no text of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Unable to load analysis right now. Please try again.";
