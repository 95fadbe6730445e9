//! In-memory session store
//!
//! Maps a random session id to the signed-in user's credential. The store is
//! owned by the router state and handed to handlers as `Arc<SessionStore>`;
//! nothing here is global. Records live until `/logout` or process exit.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use identity::TokenCredential;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One signed-in browser.
#[derive(Clone)]
pub struct SessionRecord {
    pub credential: Arc<dyn TokenCredential>,
    pub user_name: String,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under a fresh UUID v4 and return the id.
    ///
    /// An existing key is never overwritten; a colliding id is regenerated.
    pub async fn create(&self, credential: Arc<dyn TokenCredential>, user_name: String) -> String {
        let mut sessions = self.sessions.write().await;
        loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = sessions.entry(id.clone()) {
                slot.insert(SessionRecord {
                    credential,
                    user_name,
                });
                return id;
            }
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
