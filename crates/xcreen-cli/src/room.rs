//! `xcreen room ...`: inspect and clear the reload cache.

use xcreen_common::XcreenError;
use xcreen_session::{join_url, RoomCache};

/// Render a cached room as JSON, with a join link when a base URL is set.
pub fn show(cache: &RoomCache, room: Option<&str>, base_url: &str) -> Result<String, XcreenError> {
    let session = cache.get(room);
    if session.is_empty() {
        return Ok(match room {
            Some(id) => format!("No cached state for room {id}"),
            None => "No cached room".to_string(),
        });
    }
    let mut out = serde_json::to_string_pretty(&session)
        .map_err(|e| XcreenError::Other(format!("failed to serialize room: {e}")))?;
    if !base_url.is_empty() {
        out.push_str(&format!("\njoin: {}", join_url(base_url, &session.room_id)));
    }
    Ok(out)
}

pub fn clear(cache: &RoomCache, room: &str) -> String {
    cache.clear(room);
    tracing::info!(room_id = room, "Cleared cached room");
    format!("Cleared room {room}")
}
