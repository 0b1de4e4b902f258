//! Centralized default constants for estate-sync.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for every entity list view.
pub const PAGE_SIZE: u32 = 10;

/// First page index (pages are zero-based on the wire).
pub const FIRST_PAGE: u32 = 0;

/// Default sort column.
pub const SORT_COLUMN: &str = "id";

// =============================================================================
// REST CLIENT
// =============================================================================

/// Default backend base URL.
pub const API_URL: &str = "http://localhost:8080";

/// Default HTTP request timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PUSH CHANNEL
// =============================================================================

/// Default STOMP-over-WebSocket endpoint.
pub const WS_URL: &str = "ws://localhost:8080/ws/websocket";

/// STOMP protocol versions offered in CONNECT.
pub const STOMP_ACCEPT_VERSION: &str = "1.2";

/// Timeout for the CONNECTED reply after CONNECT, in seconds.
pub const STOMP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Buffer capacity for per-view notification broadcast channels.
pub const NOTIFICATION_CAPACITY: usize = 64;

// =============================================================================
// SESSION
// =============================================================================

/// Claim carrying the user's role in issued tokens.
pub const ROLE_CLAIM: &str = "role";
