//! Tests for the core domain types.
//!
//! - `session` - Session construction, transitions and slugs
//! - `status` - SessionState / AgentStatus parsing and display
