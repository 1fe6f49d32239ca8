//! Small helpers shared by the HTTP layer; mirrors the teacher's `util.rs` in spirit (a home for
//! odds and ends that don't warrant their own module) but scoped to what this crate actually uses.

/// Parses a `limit` query parameter the way `Storage::load_executions` expects it: `None` or a
/// non-positive value both mean "unbounded", matching §4.2's "`limit <= 0` means unbounded".
pub fn parse_limit(raw: Option<i64>) -> usize {
  return match raw {
    Some(n) if n > 0 => n as usize,
    _ => usize::MAX,
  };
}
