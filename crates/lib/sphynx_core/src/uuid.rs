// Record identifiers.
//
// Users and agents are keyed by UUIDv7 so ids sort by creation time; the
// agent listing and the stale-agent scan both order by it.

use uuid::Uuid;

/// Generate a new record id (UUIDv7, timestamp-sortable).
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// Parse an id from its textual form, e.g. a token subject.
pub fn parse_id(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}
