//! Shared helpers for best-effort error handling.

use super::error::LobError;

/// Log a failed best-effort step at warn level and keep it as a suppressed error.
///
/// Used on cleanup paths where a secondary failure must not mask the primary one.
///
/// # Example
/// ```ignore
/// let mut suppressed = Vec::new();
/// suppress(ctx.rollback(), "rollback after cancel", &mut suppressed);
/// ```
pub fn suppress<T>(
    result: Result<T, LobError>,
    context: &str,
    suppressed: &mut Vec<LobError>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            suppressed.push(e);
            None
        }
    }
}
