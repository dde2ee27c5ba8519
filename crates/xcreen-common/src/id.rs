use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Characters used in room codes. Drops `0 1 l o` so codes survive being
/// read aloud or typed from a screen.
const ROOM_CODE_ALPHABET: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";
const ROOM_CODE_LEN: usize = 8;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh room code, e.g. `k7xq2mfa`.
pub fn new_room_code() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(ROOM_CODE_LEN)
        .map(|b| ROOM_CODE_ALPHABET[usize::from(*b) % ROOM_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Identity of one state-machine run. A completion that carries a
/// different `SessionId` than the live one is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell runs apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_uses_unambiguous_alphabet() {
        for _ in 0..64 {
            let code = new_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|c| ROOM_CODE_ALPHABET.contains(&c)), "{code}");
        }
    }

    #[test]
    fn room_codes_differ() {
        assert_ne!(new_room_code(), new_room_code());
    }

    #[test]
    fn participant_ids_are_uuids() {
        assert!(Uuid::parse_str(&new_id()).is_ok());
    }

    #[test]
    fn session_ids_are_distinct_runs() {
        let run = SessionId::new();
        let copy = run;
        assert_eq!(run, copy);
        assert_ne!(run, SessionId::new());
        assert_eq!(run.to_string().len(), 8);
    }

    #[test]
    fn session_id_serializes_as_plain_uuid() {
        let run = SessionId::new();
        let json = serde_json::to_string(&run).unwrap();
        assert_eq!(json.len(), 38);
        assert_eq!(serde_json::from_str::<SessionId>(&json).unwrap(), run);
    }
}
