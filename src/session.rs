//! In-memory session store.
//!
//! One `parking_lot::Mutex` guards the whole map. Callers never hold the lock
//! across an `.await`: the workflow takes a [`Session`] snapshot with
//! [`SessionStore::get`], runs the slow stages unlocked, then writes results
//! back with [`SessionStore::update`]. Two concurrent generations for the
//! same session therefore resolve as last-writer-wins.
//!
//! Sessions expire after an idle TTL and the least recently used session is
//! evicted when the store is full, so memory stays bounded under load.

use crate::error::MarmoError;
use crate::model::{FormInput, Session, SessionId, SessionSummary, UploadedImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry {
    session: Session,
    last_access: Instant,
}

/// Thread-safe map of live sessions.
pub struct SessionStore {
    inner: Mutex<HashMap<SessionId, Entry>>,
    ttl: Option<Duration>,
    capacity: usize,
}

impl SessionStore {
    /// `ttl` of `None` disables expiry. `capacity` is clamped to at least 1.
    pub fn new(ttl: Option<Duration>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Store a new session and return its freshly generated id.
    pub fn create(&self, images: Vec<UploadedImage>, form: FormInput) -> SessionId {
        let id = SessionId::generate();
        let now = Instant::now();
        let mut map = self.inner.lock();

        self.purge_expired_locked(&mut map, now);
        while map.len() >= self.capacity {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting least recently used session {key}");
                    map.remove(&key);
                }
                None => break,
            }
        }

        map.insert(
            id.clone(),
            Entry {
                session: Session::new(id.clone(), images, form),
                last_access: now,
            },
        );
        id
    }

    /// Snapshot of a session. Refreshes its access time.
    pub fn get(&self, id: &str) -> Result<Session, MarmoError> {
        self.with_entry(id, |session| session.clone())
    }

    /// Run `mutator` on the stored session under the store lock.
    pub fn update<R>(
        &self,
        id: &str,
        mutator: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, MarmoError> {
        self.with_entry(id, mutator)
    }

    /// Client-facing view without image bytes.
    pub fn summarize(&self, id: &str) -> Result<SessionSummary, MarmoError> {
        self.with_entry(id, |session| session.summary())
    }

    /// Number of live sessions. Expired ones are purged first.
    pub fn len(&self) -> usize {
        let mut map = self.inner.lock();
        self.purge_expired_locked(&mut map, Instant::now());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entry<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R, MarmoError> {
        let now = Instant::now();
        let mut map = self.inner.lock();

        if map.get(id).is_some_and(|e| self.is_expired(e, now)) {
            debug!("Session {id} expired");
            map.remove(id);
        }

        let entry = map.get_mut(id).ok_or(MarmoError::SessionNotFound)?;
        entry.last_access = now;
        Ok(f(&mut entry.session))
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_access) > ttl)
    }

    fn purge_expired_locked(&self, map: &mut HashMap<SessionId, Entry>, now: Instant) {
        if self.ttl.is_none() {
            return;
        }
        let before = map.len();
        map.retain(|_, e| !self.is_expired(e, now));
        let removed = before - map.len();
        if removed > 0 {
            debug!("Purged {removed} expired session(s)");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(86_400)), 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionStatus;

    fn store(ttl: Option<Duration>, cap: usize) -> SessionStore {
        SessionStore::new(ttl, cap)
    }

    #[test]
    fn ids_are_unique() {
        let s = store(None, 100);
        let a = s.create(vec![], FormInput::default());
        let b = s.create(vec![], FormInput::default());
        assert_ne!(a, b);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let s = store(None, 10);
        assert!(matches!(s.get("nope"), Err(MarmoError::SessionNotFound)));
        assert!(matches!(
            s.update("nope", |_| ()),
            Err(MarmoError::SessionNotFound)
        ));
    }

    #[test]
    fn update_is_visible_to_get() {
        let s = store(None, 10);
        let id = s.create(vec![], FormInput::default());
        s.update(id.as_str(), |sess| sess.advance(SessionStatus::DrawingCreated))
            .unwrap();
        assert_eq!(
            s.get(id.as_str()).unwrap().status,
            SessionStatus::DrawingCreated
        );
    }

    #[test]
    fn expired_sessions_disappear() {
        let s = store(Some(Duration::from_millis(0)), 10);
        let id = s.create(vec![], FormInput::default());
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(s.get(id.as_str()), Err(MarmoError::SessionNotFound)));
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn least_recently_used_is_evicted_at_capacity() {
        let s = store(None, 2);
        let a = s.create(vec![], FormInput::default());
        std::thread::sleep(Duration::from_millis(2));
        let b = s.create(vec![], FormInput::default());
        std::thread::sleep(Duration::from_millis(2));
        // Touch `a` so `b` becomes the oldest.
        s.get(a.as_str()).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let c = s.create(vec![], FormInput::default());

        assert_eq!(s.len(), 2);
        assert!(s.get(a.as_str()).is_ok());
        assert!(s.get(b.as_str()).is_err());
        assert!(s.get(c.as_str()).is_ok());
    }

    #[test]
    fn summary_omits_image_bytes() {
        use crate::model::{ImageKind, UploadedImage};
        let s = store(None, 10);
        let img = UploadedImage {
            filename: "a.png".into(),
            data: bytes::Bytes::from_static(b"fake"),
            width: 4,
            height: 3,
            kind: ImageKind::Png,
        };
        let id = s.create(vec![img], FormInput::default());
        let json = serde_json::to_value(s.summarize(id.as_str()).unwrap()).unwrap();
        assert_eq!(json["images"][0]["filename"], "a.png");
        assert_eq!(json["images"][0]["width"], 4);
        assert!(json["images"][0].get("data").is_none());
        assert_eq!(json["status"], "uploaded");
    }
}
