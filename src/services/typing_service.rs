//! Typing Indicator Bus
//!
//! One instance per session. Composer input registers a local
//! (conversation, user) entry with a TTL and publishes the same expiry to
//! the shared bus; other sessions merge the entry and run their own
//! expiry timer. Clears are explicit events so remote entries drop
//! immediately instead of waiting out the TTL. Timers live in a keyed
//! registry; registering a key always supersedes the prior timer.

use crate::bus::{decode_event, BusEvent, MessageBus, TYPING_TOPIC};
use crate::config::Config;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

type TypingKey = (Uuid, Uuid); // (conversation, user)

pub struct TypingIndicatorBus {
    inner: Arc<TypingInner>,
    listener: JoinHandle<()>,
}

struct TypingInner {
    local_user: Uuid,
    ttl: Duration,
    bus: Arc<dyn MessageBus>,
    entries: RwLock<HashMap<TypingKey, DateTime<Utc>>>,
    timers: Mutex<HashMap<TypingKey, JoinHandle<()>>>,
}

impl TypingIndicatorBus {
    pub async fn new(local_user: Uuid, bus: Arc<dyn MessageBus>, config: Arc<Config>) -> Self {
        let inner = Arc::new(TypingInner {
            local_user,
            ttl: config.typing_ttl(),
            bus: Arc::clone(&bus),
            entries: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        });

        let mut rx = bus.subscribe(TYPING_TOPIC).await;
        let weak = Arc::downgrade(&inner);
        let listener = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if let Some(event) = decode_event(&payload) {
                    inner.handle_remote(event).await;
                }
            }
        });

        Self { inner, listener }
    }

    /// Composer input hook. Non-empty trimmed text renews the local
    /// typing entry and announces it; empty text clears.
    pub async fn composer_input(&self, conversation_id: Uuid, text: &str) {
        if text.trim().is_empty() {
            self.clear(conversation_id).await;
            return;
        }

        let expires_at =
            Utc::now() + chrono::Duration::milliseconds(self.inner.ttl.as_millis() as i64);
        self.inner
            .register(conversation_id, self.inner.local_user, expires_at)
            .await;
        self.inner
            .bus
            .publish_event(
                TYPING_TOPIC,
                &BusEvent::Typing {
                    conversation_id,
                    user_id: self.inner.local_user,
                    expires_at,
                },
            )
            .await;
    }

    /// Explicit clear: emptied input, blur, send, or conversation switch.
    /// Idempotent locally; the clear event is always announced so remote
    /// entries drop without waiting for their TTL.
    pub async fn clear(&self, conversation_id: Uuid) {
        self.inner
            .remove(conversation_id, self.inner.local_user)
            .await;
        self.inner
            .bus
            .publish_event(
                TYPING_TOPIC,
                &BusEvent::TypingCleared {
                    conversation_id,
                    user_id: self.inner.local_user,
                },
            )
            .await;
    }

    /// Users currently typing in a conversation, excluding expired
    /// entries whose timer has not fired yet.
    pub async fn typists(&self, conversation_id: Uuid) -> Vec<Uuid> {
        let now = Utc::now();
        self.inner
            .entries
            .read()
            .await
            .iter()
            .filter(|((conv, _), expiry)| *conv == conversation_id && **expiry > now)
            .map(|((_, user), _)| *user)
            .collect()
    }

    /// Drop entries for conversations the client no longer knows about.
    pub async fn prune(&self, known_conversations: &[Uuid]) {
        let stale: Vec<TypingKey> = self
            .inner
            .entries
            .read()
            .await
            .keys()
            .filter(|(conv, _)| !known_conversations.contains(conv))
            .copied()
            .collect();
        for (conv, user) in stale {
            self.inner.remove(conv, user).await;
        }
    }

    /// Tear down the listener and all pending timers.
    pub async fn close(&self) {
        self.listener.abort();
        let mut timers = self.inner.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        self.inner.entries.write().await.clear();
    }
}

impl Drop for TypingIndicatorBus {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl TypingInner {
    async fn handle_remote(self: &Arc<Self>, event: BusEvent) {
        match event {
            BusEvent::Typing {
                conversation_id,
                user_id,
                expires_at,
            } => {
                // Own events come back over the shared bus; skip them.
                if user_id == self.local_user {
                    return;
                }
                self.register(conversation_id, user_id, expires_at).await;
            }
            BusEvent::TypingCleared {
                conversation_id,
                user_id,
            } => {
                if user_id == self.local_user {
                    return;
                }
                self.remove(conversation_id, user_id).await;
            }
            _ => {}
        }
    }

    /// Upsert an entry and (re)arm its expiry timer. The new timer always
    /// supersedes the previous one for the key, so an earlier keystroke
    /// can never expire a renewed entry prematurely.
    async fn register(self: &Arc<Self>, conversation_id: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) {
        let key = (conversation_id, user_id);
        self.entries.write().await.insert(key, expires_at);

        let weak = Arc::downgrade(self);
        let delay = (expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(key, expires_at).await;
            }
        });

        let mut timers = self.timers.lock().await;
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// TTL expiry. Only applies if the entry still carries the expiry the
    /// timer was armed with; a renewal in the meantime makes this a no-op.
    async fn expire(&self, key: TypingKey, expected: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        if entries.get(&key) == Some(&expected) {
            entries.remove(&key);
            drop(entries);
            self.timers.lock().await.remove(&key);
            debug!(conversation_id = %key.0, user_id = %key.1, "typing entry expired");
        }
    }

    async fn remove(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        let key = (conversation_id, user_id);
        if let Some(handle) = self.timers.lock().await.remove(&key) {
            handle.abort();
        }
        self.entries.write().await.remove(&key).is_some()
    }
}
