// Database open and lazy schema upgrade
//
// The schema version lives in a `meta` tree; opening an older (or fresh)
// database runs the tree setup, which is idempotent. Opening a newer
// database is refused — downgrade is unsupported.

use std::path::Path;

use tracing::{debug, info};

use crate::StoreError;

pub(crate) const SCHEMA_VERSION: u32 = 1;

pub(crate) const META_TREE: &str = "meta";
pub(crate) const MESSAGES_TREE: &str = "messages";
pub(crate) const SESSION_INDEX_TREE: &str = "idx_session";
pub(crate) const TIME_INDEX_TREE: &str = "idx_timestamp";

pub(crate) const VERSION_KEY: &[u8] = b"schema_version";

/// An open database plus its trees. One collection, two secondary indexes.
pub(crate) struct StoreHandle {
    pub(crate) db: sled::Db,
    /// Primary collection: big-endian u64 surrogate key -> json record.
    pub(crate) messages: sled::Tree,
    /// Non-unique index: session id ++ 0x00 ++ id -> primary key.
    pub(crate) by_session: sled::Tree,
    /// Non-unique index: timestamp ++ id -> primary key.
    pub(crate) by_time: sled::Tree,
}

pub(crate) fn open(path: &Path) -> Result<StoreHandle, StoreError> {
    let db = sled::open(path)?;
    let meta = db.open_tree(META_TREE)?;

    let found = match meta.get(VERSION_KEY)? {
        Some(raw) => Some(decode_version(&raw)?),
        None => None,
    };

    match found {
        Some(version) if version > SCHEMA_VERSION => {
            return Err(StoreError::SchemaVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        Some(version) if version < SCHEMA_VERSION => {
            info!(from = version, to = SCHEMA_VERSION, "upgrading schema");
        }
        Some(_) => {
            debug!(version = SCHEMA_VERSION, "schema up to date");
        }
        None => {
            info!(version = SCHEMA_VERSION, path = %path.display(), "creating schema");
        }
    }

    // open_tree creates on first use and is a no-op afterwards, so the
    // setup below is safe to re-run on every open.
    let messages = db.open_tree(MESSAGES_TREE)?;
    let by_session = db.open_tree(SESSION_INDEX_TREE)?;
    let by_time = db.open_tree(TIME_INDEX_TREE)?;

    if found != Some(SCHEMA_VERSION) {
        meta.insert(VERSION_KEY, &SCHEMA_VERSION.to_be_bytes()[..])?;
        meta.flush()?;
    }

    Ok(StoreHandle {
        db,
        messages,
        by_session,
        by_time,
    })
}

fn decode_version(raw: &[u8]) -> Result<u32, StoreError> {
    let bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| StoreError::CorruptMeta(format!("version record is {} bytes", raw.len())))?;
    Ok(u32::from_be_bytes(bytes))
}

// ============================================================================
// KEY ENCODING
// ============================================================================

/// Primary key: big-endian id, so iteration order equals insertion order.
pub(crate) fn message_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Session index key. The 0x00 separator keeps one session's range from
/// bleeding into another's during prefix scans, which is why session ids
/// must not contain NUL bytes.
pub(crate) fn session_index_key(session_id: &str, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(session_id.len() + 9);
    key.extend_from_slice(session_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub(crate) fn session_index_prefix(session_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(session_id.len() + 1);
    prefix.extend_from_slice(session_id.as_bytes());
    prefix.push(0);
    prefix
}

/// Timestamp index key; the trailing id disambiguates equal timestamps.
pub(crate) fn time_index_key(timestamp: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&timestamp.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let handle = open(&path).unwrap();
            handle.messages.insert(message_key(1), b"x".as_slice()).unwrap();
        }

        // Re-open runs the setup again without clobbering data.
        let handle = open(&path).unwrap();
        let stored = handle.messages.get(message_key(1)).unwrap().unwrap();
        assert_eq!(stored.as_ref(), b"x".as_slice());

        let version = handle.db.open_tree(META_TREE).unwrap().get(VERSION_KEY).unwrap().unwrap();
        assert_eq!(version.as_ref(), SCHEMA_VERSION.to_be_bytes().as_slice());
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let db = sled::open(&path).unwrap();
            let meta = db.open_tree(META_TREE).unwrap();
            meta.insert(VERSION_KEY, &99u32.to_be_bytes()[..]).unwrap();
        }

        match open(&path) {
            Err(StoreError::SchemaVersion { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaVersion error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn corrupt_version_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let db = sled::open(&path).unwrap();
            let meta = db.open_tree(META_TREE).unwrap();
            meta.insert(VERSION_KEY, b"not-a-version".as_slice()).unwrap();
        }

        assert!(matches!(open(&path), Err(StoreError::CorruptMeta(_))));
    }

    #[test]
    fn session_prefix_does_not_bleed_across_ids() {
        // "abc" must never match entries for session "abcd".
        let key = session_index_key("abcd", 7);
        assert!(!key.starts_with(&session_index_prefix("abc")));
        assert!(key.starts_with(&session_index_prefix("abcd")));
    }

    #[test]
    fn time_index_keys_sort_by_timestamp_then_id() {
        let mut keys = vec![
            time_index_key(200, 1),
            time_index_key(100, 2),
            time_index_key(100, 1),
        ];
        keys.sort();
        assert_eq!(keys[0], time_index_key(100, 1));
        assert_eq!(keys[1], time_index_key(100, 2));
        assert_eq!(keys[2], time_index_key(200, 1));
    }
}
