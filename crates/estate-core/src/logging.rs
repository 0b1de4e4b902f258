//! Structured logging field name constants for estate-sync.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Push connection lost or refused, fetch failures surfaced to the user |
//! | WARN  | Recoverable issue, fallback applied (least-privilege role, truncated page) |
//! | INFO  | Lifecycle events (connect, disconnect, view mount/unmount) |
//! | DEBUG | Reconciliation decisions, superseded fetches, subscriptions |
//! | TRACE | Per-frame and per-row data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "rest", "push", "sync", "session"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hub", "reconciler", "view", "fetcher"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "fetch", "refresh", "subscribe", "handle_event"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Entity kind ("flat", "house", "upload-file-history", "admin-creation-request").
pub const ENTITY: &str = "entity";

/// Entity id being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Push channel topic.
pub const TOPIC: &str = "topic";

/// STOMP subscription id.
pub const SUBSCRIPTION_ID: &str = "subscription_id";

// ─── Query fields ──────────────────────────────────────────────────────────

/// Zero-based page index.
pub const PAGE: &str = "page";

/// Page size.
pub const PAGE_SIZE: &str = "page_size";

/// Fetch sequence number (last-fetch-wins guard).
pub const FETCH_SEQ: &str = "fetch_seq";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned by a fetch.
pub const RESULT_COUNT: &str = "result_count";

/// Number of active handlers/channels.
pub const ACTIVE: &str = "active";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Every field name above.
pub const ALL_FIELDS: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    ENTITY,
    ENTITY_ID,
    TOPIC,
    SUBSCRIPTION_ID,
    PAGE,
    PAGE_SIZE,
    FETCH_SEQ,
    DURATION_MS,
    RESULT_COUNT,
    ACTIVE,
    ERROR_MSG,
];
