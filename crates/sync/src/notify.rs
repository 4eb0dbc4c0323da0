//! Turns new-message events into a haptic pulse plus one system notification.

use std::sync::Arc;

use giftshop_core::PermissionStatus;
use tokio::sync::OnceCell;
use tracing::instrument;
use uuid::Uuid;

use crate::clients::{NotificationRequest, Notifier};
use crate::config::NotificationText;
use crate::unread::NewMessage;

/// What happened to a single [`NewMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Vibrated and scheduled a notification.
    Delivered,
    /// Permission not granted; nothing was shown.
    Suppressed,
    /// The notifier failed to schedule; logged and dropped.
    Failed,
}

/// Notification dispatcher.
///
/// Permission is requested at most once per dispatcher. Until it is granted
/// every dispatch is suppressed; unread tracking is unaffected either way.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    notifier: Arc<dyn Notifier>,
    text: NotificationText,
    permission: OnceCell<PermissionStatus>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, text: NotificationText) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                notifier,
                text,
                permission: OnceCell::new(),
            }),
        }
    }

    /// Ask for notification permission. Later calls return the first answer
    /// without asking again. A failed request counts as denied.
    pub async fn request_permission(&self) -> PermissionStatus {
        *self
            .inner
            .permission
            .get_or_init(|| async {
                match self.inner.notifier.request_permission().await {
                    Ok(status) => {
                        tracing::info!(%status, "Notification permission resolved");
                        status
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Notification permission request failed");
                        PermissionStatus::Denied
                    }
                }
            })
            .await
    }

    /// Permission as last resolved, `Undetermined` before the request.
    #[must_use]
    pub fn permission(&self) -> PermissionStatus {
        self.inner
            .permission
            .get()
            .copied()
            .unwrap_or(PermissionStatus::Undetermined)
    }

    /// Vibrate and schedule exactly one notification for `event`.
    #[instrument(skip(self, event), fields(delta = event.delta, total = event.total))]
    pub async fn dispatch(&self, event: &NewMessage) -> DispatchOutcome {
        if !self.permission().is_granted() {
            tracing::debug!("Notification suppressed: permission not granted");
            return DispatchOutcome::Suppressed;
        }

        if let Err(e) = self.inner.notifier.vibrate().await {
            tracing::warn!(error = %e, "Vibration failed");
        }

        let request = NotificationRequest {
            id: Uuid::new_v4(),
            title: self.inner.text.title.clone(),
            body: self.inner.text.body.clone(),
            sound: true,
        };
        match self.inner.notifier.schedule(request).await {
            Ok(()) => DispatchOutcome::Delivered,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to schedule notification");
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Effect, EffectLog, MemoryNotifier};

    fn event(delta: u64) -> NewMessage {
        NewMessage::new(delta, delta + 1)
    }

    fn dispatcher(notifier: &MemoryNotifier) -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(notifier.clone()), NotificationText::default())
    }

    #[tokio::test]
    async fn test_granted_dispatch_vibrates_and_notifies_once() {
        let log = EffectLog::new();
        let notifier = MemoryNotifier::granting(log.clone());
        let dispatcher = dispatcher(&notifier);

        assert_eq!(
            dispatcher.request_permission().await,
            PermissionStatus::Granted
        );
        assert_eq!(
            dispatcher.dispatch(&event(3)).await,
            DispatchOutcome::Delivered
        );

        assert_eq!(notifier.vibrations(), 1);
        let sent = notifier.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.first().map(|n| n.title.as_str()), Some("New message"));
        assert_eq!(
            log.effects(),
            vec![
                Effect::PermissionRequested,
                Effect::Vibrated,
                Effect::Notified("New message".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_each_event_fires_independently() {
        let notifier = MemoryNotifier::granting(EffectLog::new());
        let dispatcher = dispatcher(&notifier);
        dispatcher.request_permission().await;

        dispatcher.dispatch(&event(1)).await;
        dispatcher.dispatch(&event(1)).await;
        assert_eq!(notifier.notifications().len(), 2);
        assert_eq!(notifier.vibrations(), 2);
    }

    #[tokio::test]
    async fn test_permission_requested_once() {
        let notifier = MemoryNotifier::granting(EffectLog::new());
        let dispatcher = dispatcher(&notifier);

        dispatcher.request_permission().await;
        dispatcher.request_permission().await;
        assert_eq!(notifier.permission_requests(), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_suppresses_dispatch() {
        let notifier = MemoryNotifier::denying(EffectLog::new());
        let dispatcher = dispatcher(&notifier);

        assert_eq!(
            dispatcher.request_permission().await,
            PermissionStatus::Denied
        );
        assert_eq!(
            dispatcher.dispatch(&event(2)).await,
            DispatchOutcome::Suppressed
        );
        assert_eq!(notifier.vibrations(), 0);
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_before_permission_is_suppressed() {
        let notifier = MemoryNotifier::granting(EffectLog::new());
        let dispatcher = dispatcher(&notifier);

        assert_eq!(dispatcher.permission(), PermissionStatus::Undetermined);
        assert_eq!(
            dispatcher.dispatch(&event(2)).await,
            DispatchOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn test_schedule_failure_is_not_fatal() {
        let notifier = MemoryNotifier::granting(EffectLog::new());
        notifier.fail_schedules(true);
        let dispatcher = dispatcher(&notifier);
        dispatcher.request_permission().await;

        assert_eq!(
            dispatcher.dispatch(&event(1)).await,
            DispatchOutcome::Failed
        );
        assert_eq!(notifier.vibrations(), 1);
    }
}
