//! Global constants for relayout
//!
//! Consolidates timing limits and device naming constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// Double-tap detection threshold in milliseconds
pub const DOUBLE_TAP_TIMEOUT_MS: u64 = 300;

/// Window after a replay in which trigger-modifier releases are ignored
pub const REPLAY_SUPPRESS_MS: u64 = 150;

/// Main loop poll timeout in milliseconds (bounds shutdown latency)
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Delay before opening a freshly hot-plugged device node
pub const HOTPLUG_SETTLE_DELAY_MS: u64 = 300;

/// How long a background worker may take to stop before it is detached
pub const WORKER_JOIN_TIMEOUT_MS: u64 = 1000;

/// Granularity at which background workers check their stop flag
pub const WORKER_TICK_MS: u64 = 200;

/// Age after which an automatic-conversion marker no longer counts
pub const CORRECTION_TIMEOUT_SECS: u64 = 5;

/// Timeout for reading the primary selection
pub const SELECTION_READ_TIMEOUT_MS: u64 = 500;

/// Pause between paste and clipboard restore
pub const PASTE_SETTLE_MS: u64 = 80;

/// Pause between synthetic keystrokes during replay
pub const REPLAY_KEY_DELAY_MS: u64 = 5;

/// Interval between system layout list refreshes
pub const LAYOUT_POLL_INTERVAL_SECS: u64 = 5;

// ============================================================================
// Buffer Limits
// ============================================================================

/// Maximum number of events kept in the input buffer
pub const MAX_BUFFER_EVENTS: usize = 512;

/// Maximum number of extend-left steps while expanding a selection
pub const MAX_EXPAND_STEPS: usize = 32;

// ============================================================================
// Device Naming
// ============================================================================

/// Name of our own uinput keyboard. Must never be monitored.
pub const VIRTUAL_KEYBOARD_NAME: &str = "relayout virtual keyboard";

/// Device name fragments that are never monitored
pub const DEFAULT_DEVICE_EXCLUDES: &[&str] = &[VIRTUAL_KEYBOARD_NAME, "uinput", "virtual"];

/// Directory scanned for evdev nodes
pub const INPUT_DIR: &str = "/dev/input";

/// Prefix of evdev node names inside [`INPUT_DIR`]
pub const EVENT_NODE_PREFIX: &str = "event";
