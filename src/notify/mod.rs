//! Notification gate. A state machine over `Feed.status`
//! transitions decides whether to fire, and a `NotificationSink` trait
//! abstracts the concrete transport (email/SMS/push) as an external
//! collaborator; this crate ships a logging sink as the reference impl.

use crate::models::{Contact, Dealer, FeedStatus};
use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Failed,
    Warning,
    Recovered,
    SubscriptionExpiring,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, recipient: &Contact, kind: NotificationKind, feed_id: &str, detail: &str);
}

/// Reference sink: logs at a level matching severity. Real delivery
/// (email/SMS/push rendering) lives outside this crate's scope.
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn send(&self, recipient: &Contact, kind: NotificationKind, feed_id: &str, detail: &str) {
        match kind {
            NotificationKind::Failed => warn!(
                recipient = %recipient.email, feed_id, detail, "feed notification: FAILED"
            ),
            NotificationKind::Warning => warn!(
                recipient = %recipient.email, feed_id, detail, "feed notification: WARNING"
            ),
            NotificationKind::Recovered => info!(
                recipient = %recipient.email, feed_id, detail, "feed notification: RECOVERED"
            ),
            NotificationKind::SubscriptionExpiring => warn!(
                recipient = %recipient.email, feed_id, detail, "feed notification: SUBSCRIPTION_EXPIRING"
            ),
        }
    }
}

/// Maps a feed status transition to the notification it should fire.
/// `None` means no-op (suppressed or irrelevant transition).
pub fn transition_notification(previous: FeedStatus, current: FeedStatus) -> Option<NotificationKind> {
    use FeedStatus::*;
    match (previous, current) {
        (Healthy, Failed) | (Warning, Failed) | (Pending, Failed) => Some(NotificationKind::Failed),
        (Healthy, Warning) | (Pending, Warning) => Some(NotificationKind::Warning),
        (Warning, Warning) => None,
        (Failed, Healthy) | (Warning, Healthy) => Some(NotificationKind::Recovered),
        _ => None,
    }
}

/// Fans a feed-status transition out to the dealer's opted-in contact, if
/// any. Send failures are swallowed: notification delivery must never
/// propagate into the pipeline's failure path.
pub async fn notify_feed_transition(
    sink: &dyn NotificationSink,
    dealer: &Dealer,
    feed_id: &str,
    previous: FeedStatus,
    current: FeedStatus,
) {
    let Some(kind) = transition_notification(previous, current) else { return };
    let Some(recipient) = dealer.notification_recipient() else { return };
    sink.send(recipient, kind, feed_id, &format!("{previous:?} -> {current:?}")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use FeedStatus::*;

    #[test]
    fn healthy_to_failed_sends_failed() {
        assert_eq!(transition_notification(Healthy, Failed), Some(NotificationKind::Failed));
    }

    #[test]
    fn warning_to_warning_is_suppressed() {
        assert_eq!(transition_notification(Warning, Warning), None);
    }

    #[test]
    fn failed_to_healthy_sends_recovered() {
        assert_eq!(transition_notification(Failed, Healthy), Some(NotificationKind::Recovered));
    }

    #[test]
    fn healthy_to_healthy_is_noop() {
        assert_eq!(transition_notification(Healthy, Healthy), None);
    }

    #[test]
    fn pending_to_warning_sends_warning() {
        assert_eq!(transition_notification(Pending, Warning), Some(NotificationKind::Warning));
    }
}
