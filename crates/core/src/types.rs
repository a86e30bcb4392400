/// All upstream database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque per-connection identifier, assigned by the server at upgrade
/// time (UUID v4). Unique for the lifetime of a live connection.
pub type ConnectionId = String;
