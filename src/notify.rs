//! Notification matcher bridge.
//!
//! Converts a refresh cycle's new-unread delta into user-visible alerts.
//! Two-tier policy: specific rule-matched alerts are preferred, and when
//! any fire the generic "N new articles" alert is suppressed entirely.
//! The two must never both fire for the same cycle.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::ApiClient;

// ============================================================================
// Alerts and sinks
// ============================================================================

/// A single user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub priority: i32,
}

/// Alert sink. Implementations deliver alerts to whatever surface the host
/// provides; the bridge only decides *which* alerts fire.
pub trait Notifier: Send + Sync {
    fn notify(&self, alert: Alert);
}

/// Logs alerts through `tracing`. The default sink for the headless binary.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, alert: Alert) {
        tracing::info!(
            title = %alert.title,
            body = %alert.body,
            priority = alert.priority,
            "Notification"
        );
    }
}

/// Forwards alerts over an unbounded channel to the run loop.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alert: Alert) {
        // Receiver gone means the run loop is shutting down; drop silently.
        let _ = self.tx.send(alert);
    }
}

// ============================================================================
// NotificationBridge
// ============================================================================

/// Rides on top of a completed refresh cycle: fetches the cycle's pending
/// rule matches and dispatches alerts without duplicating information.
pub struct NotificationBridge {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    enabled: bool,
}

impl NotificationBridge {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self {
            api,
            notifier,
            enabled,
        }
    }

    /// Dispatch alerts for a cycle that observed `new_count` new unread
    /// articles. Returns the number of alerts actually dispatched.
    ///
    /// - Matches present: one alert per match, generic suppressed.
    /// - No matches: exactly one generic alert.
    /// - Match fetch failure: generic fallback rather than silence.
    pub async fn dispatch_for_cycle(&self, new_count: i64) -> usize {
        if !self.enabled || new_count <= 0 {
            return 0;
        }

        let matches = match self.api.pending_notifications().await {
            Ok(pending) => {
                tracing::debug!(
                    count = pending.count,
                    "Fetched pending notification matches"
                );
                pending.notifications
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch pending matches, falling back to generic alert");
                self.notifier.notify(Self::generic_alert(new_count));
                return 1;
            }
        };

        if matches.is_empty() {
            self.notifier.notify(Self::generic_alert(new_count));
            return 1;
        }

        let dispatched = matches.len();
        for m in matches {
            self.notifier.notify(Alert {
                title: m.article_title,
                body: m.match_reason,
                priority: m.priority,
            });
        }
        tracing::info!(alerts = dispatched, "Dispatched rule-matched notifications");
        dispatched
    }

    fn generic_alert(new_count: i64) -> Alert {
        Alert {
            title: "New articles".to_string(),
            body: if new_count == 1 {
                "1 new article".to_string()
            } else {
                format!("{} new articles", new_count)
            },
            priority: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records alerts for assertions.
    struct RecordingNotifier {
        alerts: Mutex<Vec<Alert>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                alerts: Mutex::new(Vec::new()),
            })
        }

        fn alerts(&self) -> Vec<Alert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, alert: Alert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    const TWO_MATCHES: &str = r#"{
        "count": 2,
        "notifications": [
            {"id":1,"articleId":10,"articleTitle":"Alpha","ruleId":1,"matchReason":"keyword: alpha","priority":1},
            {"id":2,"articleId":11,"articleTitle":"Beta","ruleId":2,"matchReason":"keyword: beta","priority":0}
        ]
    }"#;

    const NO_MATCHES: &str = r#"{"count":0,"notifications":[]}"#;

    async fn bridge_with(
        server: &MockServer,
        notifier: Arc<RecordingNotifier>,
        enabled: bool,
    ) -> NotificationBridge {
        let api = ApiClient::new(server.uri()).unwrap();
        NotificationBridge::new(api, notifier, enabled)
    }

    #[tokio::test]
    async fn test_matches_suppress_generic_alert() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_MATCHES))
            .mount(&server)
            .await;

        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), true).await;

        let dispatched = bridge.dispatch_for_cycle(5).await;
        assert_eq!(dispatched, 2);

        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Alpha");
        assert_eq!(alerts[0].body, "keyword: alpha");
        assert_eq!(alerts[1].title, "Beta");
        // No generic "new articles" alert anywhere.
        assert!(alerts.iter().all(|a| a.title != "New articles"));
    }

    #[tokio::test]
    async fn test_no_matches_yields_one_generic_alert() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NO_MATCHES))
            .mount(&server)
            .await;

        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), true).await;

        let dispatched = bridge.dispatch_for_cycle(5).await;
        assert_eq!(dispatched, 1);

        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "New articles");
        assert_eq!(alerts[0].body, "5 new articles");
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/pending"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), true).await;

        let dispatched = bridge.dispatch_for_cycle(3).await;
        assert_eq!(dispatched, 1);
        assert_eq!(notifier.alerts()[0].body, "3 new articles");
    }

    #[tokio::test]
    async fn test_zero_delta_dispatches_nothing() {
        let server = MockServer::start().await;
        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), true).await;

        assert_eq!(bridge.dispatch_for_cycle(0).await, 0);
        assert_eq!(bridge.dispatch_for_cycle(-2).await, 0);
        assert!(notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_bridge_is_silent() {
        let server = MockServer::start().await;
        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), false).await;

        assert_eq!(bridge.dispatch_for_cycle(5).await, 0);
        assert!(notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_singular_generic_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NO_MATCHES))
            .mount(&server)
            .await;

        let notifier = RecordingNotifier::new();
        let bridge = bridge_with(&server, notifier.clone(), true).await;
        bridge.dispatch_for_cycle(1).await;
        assert_eq!(notifier.alerts()[0].body, "1 new article");
    }

    #[tokio::test]
    async fn test_channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Alert {
            title: "t".into(),
            body: "b".into(),
            priority: 0,
        });
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.title, "t");
    }
}
