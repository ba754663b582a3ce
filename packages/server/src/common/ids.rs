//! Job identifiers.
//!
//! UUIDv7 embeds a millisecond timestamp so job IDs sort roughly by creation
//! order, which is convenient for log correlation without adding a second field.

use uuid::Uuid;

/// Mint a new, time-ordered job ID.
pub fn new_job_id() -> Uuid {
    Uuid::now_v7()
}
