// MessageStore — the four public operations over the message collection
//
// Lazily opens the database on first use. All writes go through one sled
// transaction spanning the collection and both indexes, so a failed save
// or delete leaves nothing behind.

use std::collections::HashMap;
use std::path::PathBuf;

use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::store::schema::{self, StoreHandle};
use crate::store::types::{MessageRecord, NewMessage, Role, SessionSummary};
use crate::StoreError;

/// Embedded chat history store.
///
/// Construct one per database path and share it by reference; the
/// underlying database opens lazily on the first operation. `init` (and
/// every other operation) is safe to call concurrently — a single open is
/// ever in flight, and a failed open leaves the store retryable.
pub struct MessageStore {
    path: PathBuf,
    handle: OnceCell<StoreHandle>,
}

impl MessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: OnceCell::new(),
        }
    }

    /// Open the database and run schema setup if needed. Idempotent;
    /// concurrent callers share one in-flight open.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<&StoreHandle, StoreError> {
        // On error the cell stays empty, so a later call retries the open
        // instead of replaying a cached failure.
        self.handle
            .get_or_try_init(|| async { schema::open(&self.path) })
            .await
    }

    /// Persist a message under `session_id`, stamping the current time.
    /// Returns the store-assigned surrogate key.
    pub async fn save(&self, session_id: &str, message: NewMessage) -> Result<u64, StoreError> {
        self.save_with_timestamp(session_id, message, now_millis()).await
    }

    async fn save_with_timestamp(
        &self,
        session_id: &str,
        message: NewMessage,
        timestamp: u64,
    ) -> Result<u64, StoreError> {
        validate_session_id(session_id)?;
        let handle = self.handle().await?;

        let id = handle.db.generate_id()?;
        let record = MessageRecord {
            id,
            session_id: session_id.to_string(),
            role: message.role,
            content: message.content,
            timestamp,
        };
        let value = serde_json::to_vec(&record)?;

        let primary = schema::message_key(id);
        let session_key = schema::session_index_key(session_id, id);
        let time_key = schema::time_index_key(timestamp, id);

        (&handle.messages, &handle.by_session, &handle.by_time)
            .transaction(|(messages, by_session, by_time)| {
                messages.insert(&primary[..], value.as_slice())?;
                by_session.insert(session_key.as_slice(), &primary[..])?;
                by_time.insert(&time_key[..], &primary[..])?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        handle.db.flush_async().await?;
        Ok(id)
    }

    /// All messages of a session, ascending by timestamp. Equal timestamps
    /// keep insertion order (surrogate-key tiebreak). Unknown sessions
    /// yield an empty vec.
    pub async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let handle = self.handle().await?;

        let mut records = Vec::new();
        for entry in handle
            .by_session
            .scan_prefix(schema::session_index_prefix(session_id))
        {
            let (_, primary) = entry?;
            if let Some(value) = handle.messages.get(&primary)? {
                records.push(serde_json::from_slice::<MessageRecord>(&value)?);
            }
        }

        records.sort_by_key(|record| (record.timestamp, record.id));
        Ok(records)
    }

    /// One summary per session, descending by latest activity.
    ///
    /// A full scan of the collection in primary-key order (which equals
    /// insertion order), folded per session: the summary timestamp tracks
    /// the latest activity, the preview text comes from the earliest user
    /// message, and sessions without one fall back to their first stored
    /// record regardless of role. Ties in latest activity keep first-seen
    /// scan order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let handle = self.handle().await?;

        // First-seen order lives in the vec; the map only locates slots.
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut folds: Vec<(String, SummaryFold)> = Vec::new();

        for entry in handle.messages.iter() {
            let (_, value) = entry?;
            let record: MessageRecord = serde_json::from_slice(&value)?;

            match slots.get(&record.session_id) {
                Some(&slot) => folds[slot].1.absorb(record),
                None => {
                    slots.insert(record.session_id.clone(), folds.len());
                    let session_id = record.session_id.clone();
                    folds.push((session_id, SummaryFold::seed(record)));
                }
            }
        }

        let mut summaries: Vec<SessionSummary> = folds
            .into_iter()
            .map(|(session_id, fold)| fold.finish(session_id))
            .collect();

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    /// Remove every record of a session. All-or-nothing: the whole batch
    /// goes through one transaction. Missing sessions complete with zero
    /// deletions.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let handle = self.handle().await?;

        // Gather the doomed index entries and the primary rows they point
        // at; records are loaded once to recover their time-index keys.
        let mut index_keys: Vec<sled::IVec> = Vec::new();
        let mut primary_keys: Vec<sled::IVec> = Vec::new();
        let mut time_keys: Vec<[u8; 16]> = Vec::new();

        for entry in handle
            .by_session
            .scan_prefix(schema::session_index_prefix(session_id))
        {
            let (index_key, primary) = entry?;
            if let Some(value) = handle.messages.get(&primary)? {
                let record: MessageRecord = serde_json::from_slice(&value)?;
                time_keys.push(schema::time_index_key(record.timestamp, record.id));
            }
            index_keys.push(index_key);
            primary_keys.push(primary);
        }

        if index_keys.is_empty() {
            return Ok(());
        }

        (&handle.messages, &handle.by_session, &handle.by_time)
            .transaction(|(messages, by_session, by_time)| {
                for key in &primary_keys {
                    messages.remove(&key[..])?;
                }
                for key in &index_keys {
                    by_session.remove(&key[..])?;
                }
                for key in &time_keys {
                    by_time.remove(&key[..])?;
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        debug!(session_id, removed = primary_keys.len(), "session deleted");
        handle.db.flush_async().await?;
        Ok(())
    }
}

/// Per-session accumulator for the summary fold.
struct SummaryFold {
    /// Latest activity seen for the session.
    latest: u64,
    /// Earliest user message seen so far: (timestamp, content, role).
    /// Tracked separately from `latest` so a later user message can never
    /// displace an earlier one.
    user_preview: Option<(u64, String, Role)>,
    /// First record in scan order, the role-agnostic fallback.
    first: (String, Role),
}

impl SummaryFold {
    fn seed(record: MessageRecord) -> Self {
        let user_preview = (record.role == Role::User)
            .then(|| (record.timestamp, record.content.clone(), record.role));
        Self {
            latest: record.timestamp,
            user_preview,
            first: (record.content, record.role),
        }
    }

    fn absorb(&mut self, record: MessageRecord) {
        self.latest = self.latest.max(record.timestamp);
        if record.role == Role::User {
            let earlier = self
                .user_preview
                .as_ref()
                .map_or(true, |(seen, _, _)| record.timestamp < *seen);
            if earlier {
                self.user_preview = Some((record.timestamp, record.content, record.role));
            }
        }
    }

    fn finish(self, session_id: String) -> SessionSummary {
        let (content, role) = match self.user_preview {
            Some((_, content, role)) => (content, role),
            None => self.first,
        };
        SessionSummary {
            session_id,
            timestamp: self.latest,
            content,
            role,
        }
    }
}

fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.is_empty() || session_id.contains('\0') {
        return Err(StoreError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
