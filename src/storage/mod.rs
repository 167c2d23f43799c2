//! Storage is organized through [session_log::SessionLogImpl].
//! The basic idea is:
//!  - There is a single file with every completed session, one JSON object per line.
//!  - Sessions are only ever appended. The only way to remove one is to clear the whole log.
//!  - Reading is best-effort: a line that doesn't parse is skipped, the rest is still returned.

pub mod entities;
pub mod session_log;
