//! Conversation memory.
//!
//! Keeps a rolling, time-bounded turn history and the inferred role for
//! every tenant-scoped user key. Records live only in memory: expired ones
//! are dropped lazily on access and by a periodic sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use superagent_core::config::{ConversationConfig, RolePolicy};
use superagent_core::persona::Labels;
use tracing::{debug, info};

use crate::roles::RoleInference;
use crate::types::ConversationSnapshot;

// =============================================================================
// ConversationRecord
// =============================================================================

#[derive(Debug, Clone)]
struct ConversationRecord {
    role: Option<String>,
    turns: Vec<String>,
    last_activity: DateTime<Utc>,
}

impl ConversationRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            role: None,
            turns: Vec::new(),
            last_activity: now,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_activity > ttl
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            role: self.role.clone(),
            turns: self.turns.clone(),
        }
    }
}

// =============================================================================
// ConversationStore
// =============================================================================

/// Process-wide conversation memory keyed by `"<tenant>:<userId>"`.
pub struct ConversationStore {
    max_turns: usize,
    ttl: chrono::Duration,
    role_policy: RolePolicy,
    labels: &'static Labels,
    roles: RoleInference,
    records: Mutex<HashMap<String, ConversationRecord>>,
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig, labels: &'static Labels, roles: RoleInference) -> Self {
        Self {
            max_turns: config.max_turns,
            ttl: chrono::Duration::minutes(i64::from(config.ttl_minutes)),
            role_policy: config.role_policy,
            labels,
            roles,
            records: Mutex::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    // A poisoned map is still structurally valid; keep serving it.
    fn records(&self) -> MutexGuard<'_, HashMap<String, ConversationRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.turn_locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch (creating if absent) the live record for `key`.
    fn live_record<'a>(
        &self,
        records: &'a mut HashMap<String, ConversationRecord>,
        key: &str,
        now: DateTime<Utc>,
    ) -> &'a mut ConversationRecord {
        if records
            .get(key)
            .is_some_and(|r| r.is_expired(now, self.ttl))
        {
            records.remove(key);
            debug!(user = %key, "Conversation expired");
        }
        records
            .entry(key.to_string())
            .or_insert_with(|| ConversationRecord::new(now))
    }

    /// Current role and turns for `key`.
    ///
    /// Creates an empty record when none exists and refreshes the activity
    /// timestamp. A record idle for longer than the TTL is treated as new.
    pub fn get_context(&self, key: &str) -> ConversationSnapshot {
        let now = Utc::now();
        let mut records = self.records();
        let record = self.live_record(&mut records, key, now);
        record.last_activity = now;
        record.snapshot()
    }

    /// Append a formatted turn and, for user turns, run role inference.
    ///
    /// Returns the role active after the update.
    pub fn add_message(&self, key: &str, text: &str, is_user: bool) -> Option<String> {
        let now = Utc::now();
        let mut records = self.records();
        let record = self.live_record(&mut records, key, now);

        let label = if is_user {
            self.labels.user_turn
        } else {
            self.labels.assistant_turn
        };
        record.turns.push(format!("{}: {}", label, text));

        // Trim to the turn window, oldest first
        while record.turns.len() > self.max_turns {
            record.turns.remove(0);
        }

        if is_user {
            if let Some(role) = self.roles.infer(text) {
                let replace = match self.role_policy {
                    RolePolicy::Override => record.role.as_deref() != Some(role),
                    RolePolicy::Sticky => record.role.is_none(),
                };
                if replace {
                    info!(user = %key, role = %role, "Role inferred");
                    record.role = Some(role.to_string());
                }
            }
        }

        record.last_activity = now;
        record.role.clone()
    }

    /// Replace the most recent assistant turn, e.g. with the refined answer.
    ///
    /// Returns `false` when the record has no assistant turn.
    pub fn replace_last_assistant_turn(&self, key: &str, text: &str) -> bool {
        let prefix = format!("{}: ", self.labels.assistant_turn);
        let mut records = self.records();
        let Some(record) = records.get_mut(key) else {
            return false;
        };
        match record.turns.iter().rposition(|t| t.starts_with(&prefix)) {
            Some(idx) => {
                record.turns[idx] = format!("{}{}", prefix, text);
                true
            }
            None => false,
        }
    }

    /// Forget the conversation for `key`. Returns whether one existed.
    pub fn reset_user(&self, key: &str) -> bool {
        let existed = self.records().remove(key).is_some();
        self.locks().remove(key);
        info!(user = %key, existed, "Conversation reset");
        existed
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let removed = {
            let mut records = self.records();
            let before = records.len();
            records.retain(|_, r| !r.is_expired(now, self.ttl));
            before - records.len()
        };

        // Turn locks for vanished records can go once nobody holds them.
        {
            let records = self.records();
            self.locks()
                .retain(|k, lock| records.contains_key(k) || Arc::strong_count(lock) > 1);
        }

        if removed > 0 {
            debug!(removed, "Expired conversations swept");
        }
        removed
    }

    /// Per-key async mutex held for the whole read-modify-write of a turn,
    /// so concurrent requests from one user are applied in order.
    pub fn turn_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.locks()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `every` until the
    /// returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_expired();
            }
        })
    }

    /// Number of live records (expired ones not yet swept included).
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use superagent_core::persona::Language;

    fn make_store() -> ConversationStore {
        make_store_with(ConversationConfig::default())
    }

    fn make_store_with(config: ConversationConfig) -> ConversationStore {
        ConversationStore::new(&config, Language::Es.labels(), RoleInference::default())
    }

    fn backdate(store: &ConversationStore, key: &str, minutes: i64) {
        let mut records = store.records();
        let record = records.get_mut(key).unwrap();
        record.last_activity = Utc::now() - chrono::Duration::minutes(minutes);
    }

    // ---- Turn formatting ----

    #[test]
    fn test_user_turn_formatting() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns, vec!["Usuario: hola".to_string()]);
        assert_eq!(ctx.role, None);
    }

    #[test]
    fn test_assistant_turn_formatting() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        store.add_message("u1", "¡Hola! ¿Qué necesitas?", false);
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns[1], "Asistente: ¡Hola! ¿Qué necesitas?");
    }

    #[test]
    fn test_english_labels() {
        let store = ConversationStore::new(
            &ConversationConfig::default(),
            Language::En.labels(),
            RoleInference::default(),
        );
        store.add_message("u1", "hi", true);
        assert_eq!(store.get_context("u1").turns, vec!["User: hi".to_string()]);
    }

    // ---- Record lifecycle ----

    #[test]
    fn test_get_context_creates_empty_record() {
        let store = make_store();
        assert!(store.is_empty());
        let ctx = store.get_context("new-user");
        assert_eq!(ctx, ConversationSnapshot::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = make_store();
        store.add_message("acme:u1", "hola", true);
        store.add_message("globex:u1", "buenas", true);
        assert_eq!(store.get_context("acme:u1").turns, vec!["Usuario: hola"]);
        assert_eq!(store.get_context("globex:u1").turns, vec!["Usuario: buenas"]);
    }

    #[test]
    fn test_reset_user() {
        let store = make_store();
        store.add_message("u1", "actúa como vendedor de autos", true);
        assert!(store.reset_user("u1"));
        assert!(!store.reset_user("u1"));
        let ctx = store.get_context("u1");
        assert!(ctx.turns.is_empty());
        assert!(ctx.role.is_none());
    }

    // ---- Turn window ----

    #[test]
    fn test_turn_window_fifo() {
        let store = make_store();
        for i in 0..15 {
            store.add_message("u1", &format!("m{}", i), i % 2 == 0);
        }
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns.len(), 10);
        assert_eq!(ctx.turns[0], "Asistente: m5");
        assert_eq!(ctx.turns[9], "Usuario: m14");
    }

    #[test]
    fn test_turn_window_exactly_at_limit() {
        let store = make_store_with(ConversationConfig {
            max_turns: 3,
            ..ConversationConfig::default()
        });
        for i in 0..3 {
            store.add_message("u1", &format!("m{}", i), true);
        }
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[0], "Usuario: m0");

        store.add_message("u1", "m3", true);
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[0], "Usuario: m1");
    }

    #[test]
    fn test_zero_turn_window() {
        let store = make_store_with(ConversationConfig {
            max_turns: 0,
            ..ConversationConfig::default()
        });
        let role = store.add_message("u1", "actúa como vendedor de autos", true);
        assert!(store.get_context("u1").turns.is_empty());
        // Role inference still runs.
        assert_eq!(role.as_deref(), Some("vendedor de autos"));
    }

    // ---- Role inference ----

    #[test]
    fn test_role_set_from_user_message() {
        let store = make_store();
        let role = store.add_message("u1", "actúa como vendedor de autos", true);
        assert_eq!(role.as_deref(), Some("vendedor de autos"));
        assert_eq!(
            store.get_context("u1").role.as_deref(),
            Some("vendedor de autos")
        );
    }

    #[test]
    fn test_role_not_inferred_from_assistant_turn() {
        let store = make_store();
        store.add_message("u1", "actúa como vendedor de autos", false);
        assert!(store.get_context("u1").role.is_none());
    }

    #[test]
    fn test_non_matching_message_keeps_role() {
        let store = make_store();
        store.add_message("u1", "eres abogado", true);
        store.add_message("u1", "¿cuánto cobras?", true);
        store.add_message("u1", "gracias", true);
        assert_eq!(store.get_context("u1").role.as_deref(), Some("abogado"));
    }

    #[test]
    fn test_role_override_policy() {
        let store = make_store();
        store.add_message("u1", "eres abogado", true);
        store.add_message("u1", "ahora actúa como vendedor de casas", true);
        assert_eq!(
            store.get_context("u1").role.as_deref(),
            Some("vendedor de casas")
        );
    }

    #[test]
    fn test_role_sticky_policy() {
        let store = make_store_with(ConversationConfig {
            role_policy: RolePolicy::Sticky,
            ..ConversationConfig::default()
        });
        store.add_message("u1", "eres abogado", true);
        store.add_message("u1", "ahora actúa como vendedor de casas", true);
        assert_eq!(store.get_context("u1").role.as_deref(), Some("abogado"));
    }

    // ---- Expiry ----

    #[test]
    fn test_expired_record_is_fresh() {
        let store = make_store();
        store.add_message("u1", "eres abogado", true);
        backdate(&store, "u1", 31);
        let ctx = store.get_context("u1");
        assert!(ctx.turns.is_empty());
        assert!(ctx.role.is_none());
    }

    #[test]
    fn test_record_within_ttl_survives() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        backdate(&store, "u1", 29);
        assert_eq!(store.get_context("u1").turns.len(), 1);
    }

    #[test]
    fn test_add_message_to_expired_record_starts_over() {
        let store = make_store();
        store.add_message("u1", "viejo", true);
        backdate(&store, "u1", 45);
        store.add_message("u1", "nuevo", true);
        assert_eq!(store.get_context("u1").turns, vec!["Usuario: nuevo"]);
    }

    #[test]
    fn test_get_context_refreshes_activity() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        backdate(&store, "u1", 20);
        store.get_context("u1");
        backdate(&store, "u1", 0);
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_sweep_expired_only_touches_stale_records() {
        let store = make_store();
        store.add_message("stale", "a", true);
        store.add_message("fresh", "b", true);
        backdate(&store, "stale", 60);
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_context("fresh").turns.len(), 1);
    }

    // ---- Assistant turn replacement ----

    #[test]
    fn test_replace_last_assistant_turn() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        store.add_message("u1", "borrador uno", false);
        store.add_message("u1", "¿y el precio?", true);
        store.add_message("u1", "borrador dos", false);
        assert!(store.replace_last_assistant_turn("u1", "versión final"));
        let ctx = store.get_context("u1");
        assert_eq!(ctx.turns[1], "Asistente: borrador uno");
        assert_eq!(ctx.turns[3], "Asistente: versión final");
    }

    #[test]
    fn test_replace_without_assistant_turn() {
        let store = make_store();
        assert!(!store.replace_last_assistant_turn("nobody", "x"));
        store.add_message("u1", "hola", true);
        assert!(!store.replace_last_assistant_turn("u1", "x"));
    }

    // ---- Turn locks ----

    #[tokio::test]
    async fn test_turn_lock_shared_per_key() {
        let store = make_store();
        let a = store.turn_lock("acme:u1");
        let b = store.turn_lock("acme:u1");
        let other = store.turn_lock("acme:u2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(other.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_turn_lock_serializes_concurrent_turns() {
        let store = Arc::new(make_store());
        let mut handles = Vec::new();
        for i in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let lock = store.turn_lock("u1");
                let _guard = lock.lock().await;
                store.add_message("u1", &format!("q{}", i), true);
                tokio::task::yield_now().await;
                store.add_message("u1", &format!("a{}", i), false);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Every user turn is immediately followed by its own answer.
        let turns = store.get_context("u1").turns;
        assert_eq!(turns.len(), 8);
        for pair in turns.chunks(2) {
            let q = pair[0].trim_start_matches("Usuario: q");
            let a = pair[1].trim_start_matches("Asistente: a");
            assert_eq!(q, a);
        }
    }

    #[tokio::test]
    async fn test_sweep_prunes_unused_turn_locks() {
        let store = make_store();
        store.add_message("u1", "hola", true);
        drop(store.turn_lock("u1"));
        drop(store.turn_lock("ghost"));
        store.sweep_expired();
        assert_eq!(store.locks().len(), 1);
        assert!(store.locks().contains_key("u1"));
    }

    #[tokio::test]
    async fn test_spawn_sweeper_evicts() {
        let store = Arc::new(make_store());
        store.add_message("u1", "hola", true);
        backdate(&store, "u1", 90);

        let handle = Arc::clone(&store).spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert!(store.is_empty());
    }
}
