//! Security action dispatch.
//!
//! Actions are appended to a per-user in-memory log, mirrored to the
//! state store when one is configured, and announced over email when a
//! sender is wired in. `email_sent` records that a notification was
//! attempted; a transport failure is logged but does not undo the
//! action itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{ActionKind, SecurityAction};
use crate::notify::{notification_for_action, EmailSender};
use crate::persistence::StateStore;

pub struct ActionDispatcher {
    actions: Mutex<HashMap<String, Vec<SecurityAction>>>,
    mailer: Option<Arc<dyn EmailSender>>,
    store: Option<Arc<dyn StateStore>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        ActionDispatcher {
            actions: Mutex::new(HashMap::new()),
            mailer: None,
            store: None,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_persistence(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record an action and attempt its notification.
    ///
    /// Returns the action as recorded, including the final `email_sent`
    /// flag.
    pub async fn dispatch(
        &self,
        kind: ActionKind,
        user_id: &str,
        reason: &str,
        ip: &str,
    ) -> SecurityAction {
        let mut action = SecurityAction::new(kind, user_id, reason, ip);

        log::warn!(
            "security action {} for user {} from {}: {}",
            kind.as_str(),
            user_id,
            ip,
            reason
        );

        // Entries are append-only, so the index stays valid across the
        // email await even when concurrent dispatches interleave
        let index = {
            let mut actions = self.actions.lock().unwrap();
            let user_log = actions.entry(user_id.to_string()).or_default();
            user_log.push(action.clone());
            user_log.len() - 1
        };

        if let Some(mailer) = &self.mailer {
            let notification =
                notification_for_action(kind, user_id, reason, ip, action.timestamp);
            if let Err(e) = mailer.send(&notification).await {
                log::error!("failed to send {} email to {}: {}", kind.as_str(), user_id, e);
            }
            // Attempted, whether or not the transport accepted it
            action.email_sent = true;

            let mut actions = self.actions.lock().unwrap();
            if let Some(entry) = actions.get_mut(user_id).and_then(|l| l.get_mut(index)) {
                entry.email_sent = true;
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.store_action(&action) {
                log::warn!("failed to persist action for {}: {}", user_id, e);
            }
        }

        action
    }

    /// Actions recorded for a user this process lifetime, oldest first.
    pub fn user_actions(&self, user_id: &str) -> Vec<SecurityAction> {
        let actions = self.actions.lock().unwrap();
        actions.get(user_id).cloned().unwrap_or_default()
    }

    pub fn total_actions(&self) -> usize {
        let actions = self.actions.lock().unwrap();
        actions.values().map(|v| v.len()).sum()
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{EmailNotification, SendError};
    use crate::persistence::SqliteStateStore;
    use async_trait::async_trait;

    struct MemoryMailer {
        sent: Mutex<Vec<EmailNotification>>,
        fail: bool,
    }

    impl MemoryMailer {
        fn new() -> Self {
            MemoryMailer {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            MemoryMailer {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EmailSender for MemoryMailer {
        async fn send(&self, notification: &EmailNotification) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Transport("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_records_and_notifies() {
        let mailer = Arc::new(MemoryMailer::new());
        let dispatcher = ActionDispatcher::new().with_mailer(mailer.clone());

        let action = dispatcher
            .dispatch(ActionKind::Enable2fa, "alice", "5 failed attempts", "1.2.3.4")
            .await;

        assert!(action.email_sent);
        assert_eq!(action.kind, ActionKind::Enable2fa);

        let log = dispatcher.user_actions("alice");
        assert_eq!(log.len(), 1);
        assert!(log[0].email_sent);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice");
        assert_eq!(sent[0].subject, "Two-Factor Authentication Setup");
    }

    #[tokio::test]
    async fn test_email_sent_flags_attempt_even_on_failure() {
        let dispatcher = ActionDispatcher::new().with_mailer(Arc::new(MemoryMailer::failing()));

        let action = dispatcher
            .dispatch(ActionKind::SecurityAlert, "alice", "breach", "1.2.3.4")
            .await;

        assert!(action.email_sent);
        assert!(dispatcher.user_actions("alice")[0].email_sent);
    }

    #[tokio::test]
    async fn test_dispatch_without_mailer_leaves_flag_unset() {
        let dispatcher = ActionDispatcher::new();

        let action = dispatcher
            .dispatch(ActionKind::ResetPassword, "alice", "breach", "1.2.3.4")
            .await;

        assert!(!action.email_sent);
        assert!(!dispatcher.user_actions("alice")[0].email_sent);
    }

    #[tokio::test]
    async fn test_dispatch_mirrors_to_store() {
        let store = Arc::new(SqliteStateStore::in_memory().unwrap());
        let dispatcher = ActionDispatcher::new()
            .with_mailer(Arc::new(MemoryMailer::new()))
            .with_persistence(store.clone());

        dispatcher
            .dispatch(ActionKind::AccountLockout, "alice", "lockout", "1.2.3.4")
            .await;

        let stored = store.get_user_actions("alice").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, ActionKind::AccountLockout);
        assert!(stored[0].email_sent);
    }

    struct SlowFirstMailer {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl EmailSender for SlowFirstMailer {
        async fn send(&self, _notification: &EmailNotification) -> Result<(), SendError> {
            let delay_ms = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                // The first send outlives the second, forcing the flag
                // updates to land out of dispatch order
                if *calls == 1 {
                    20
                } else {
                    1
                }
            };
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_flag_their_own_entries() {
        let dispatcher = ActionDispatcher::new().with_mailer(Arc::new(SlowFirstMailer {
            calls: Mutex::new(0),
        }));

        let (first, second) = tokio::join!(
            dispatcher.dispatch(ActionKind::Enable2fa, "alice", "breach", "1.2.3.4"),
            dispatcher.dispatch(ActionKind::SecurityAlert, "alice", "breach", "1.2.3.4"),
        );
        assert!(first.email_sent);
        assert!(second.email_sent);

        let log = dispatcher.user_actions("alice");
        assert_eq!(log.len(), 2);
        assert!(
            log.iter().all(|entry| entry.email_sent),
            "every attempted entry carries the flag: {:?}",
            log
        );
    }

    #[tokio::test]
    async fn test_actions_isolated_per_user() {
        let dispatcher = ActionDispatcher::new();

        dispatcher.dispatch(ActionKind::SecurityAlert, "alice", "a", "1.1.1.1").await;
        dispatcher.dispatch(ActionKind::SecurityAlert, "bob", "b", "2.2.2.2").await;
        dispatcher.dispatch(ActionKind::Enable2fa, "alice", "c", "1.1.1.1").await;

        assert_eq!(dispatcher.user_actions("alice").len(), 2);
        assert_eq!(dispatcher.user_actions("bob").len(), 1);
        assert_eq!(dispatcher.total_actions(), 3);
        assert!(dispatcher.user_actions("carol").is_empty());
    }
}
