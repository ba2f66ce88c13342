//! Journal event types shared by every emitter.
//!
//! Downstream documentation tooling matches on these strings; keep them
//! SCREAMING_SNAKE and never rename an existing one.

// Registry / production gate
pub const EVENT_REGISTRY_UPDATED: &str = "REGISTRY_UPDATED";
pub const EVENT_PRODUCTION_SET: &str = "PRODUCTION_SET";
pub const EVENT_PRODUCTION_LOCKED: &str = "PRODUCTION_LOCKED";
pub const EVENT_PRODUCTION_UNLOCKED: &str = "PRODUCTION_UNLOCKED";

// Experiments
pub const EVENT_TRAINING_COMPLETED: &str = "TRAINING_COMPLETED";

// Automation
pub const EVENT_ACTION_EXECUTED: &str = "ACTION_EXECUTED";

// Emitted by documentation generators outside this crate.
pub const EVENT_DOCS_GENERATED: &str = "DOCS_GENERATED";

/// Event types that justify an automatic checkpoint commit.
pub const AUTO_COMMIT_EVENTS: &[&str] = &[
    EVENT_TRAINING_COMPLETED,
    EVENT_REGISTRY_UPDATED,
    EVENT_DOCS_GENERATED,
    EVENT_PRODUCTION_SET,
    EVENT_PRODUCTION_LOCKED,
];
