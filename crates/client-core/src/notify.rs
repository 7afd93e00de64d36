//! Out-of-band collaborators: desktop notifications and missed-call reports
//!
//! Both are best effort. A notifier that cannot show anything returns
//! `None`; a missed-call report is spawned and its failure only logged.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// An open notification that can be closed later
pub trait Notification: Send + Sync {
    fn close(&mut self);
}

/// Shows incoming-call notifications
pub trait Notifier: Send + Sync {
    /// Show a notification; `None` if nothing could be shown
    fn notify(&self, title: &str, body: &str, icon: Option<&str>) -> Option<Box<dyn Notification>>;
}

/// Notifier that shows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _body: &str, _icon: Option<&str>) -> Option<Box<dyn Notification>> {
        None
    }
}

/// Notifier writing to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

struct LoggedNotification {
    title: String,
    closed: bool,
}

impl Notification for LoggedNotification {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::info!("Notification closed: {}", self.title);
        }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, icon: Option<&str>) -> Option<Box<dyn Notification>> {
        tracing::info!("Notification: {} - {} (icon: {:?})", title, body, icon);
        Some(Box::new(LoggedNotification { title: title.to_string(), closed: false }))
    }
}

/// Receives reports about calls that rang out unanswered
#[async_trait]
pub trait MissedCallReporter: Send + Sync {
    async fn report_missed_call(&self, caller: &str, comment: Option<&str>) -> ClientResult<()>;
}

/// Reporter that drops every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMissedCallReporter;

#[async_trait]
impl MissedCallReporter for NoopMissedCallReporter {
    async fn report_missed_call(&self, caller: &str, _comment: Option<&str>) -> ClientResult<()> {
        tracing::debug!("Missed call from {} not reported (no reporter)", caller);
        Ok(())
    }
}

/// Reports missed calls with `GET {event_uri}/missedcall?caller=..&comment=..`
#[derive(Debug, Clone)]
pub struct HttpMissedCallReporter {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpMissedCallReporter {
    pub fn new(event_uri: &str) -> ClientResult<Self> {
        let base = event_uri.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{}/missedcall", base))
            .map_err(|e| ClientError::config(format!("invalid event_uri {}: {}", event_uri, e)))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::network(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Full request URL for one report
    pub fn report_url(&self, caller: &str, comment: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("caller", caller);
            if let Some(comment) = comment {
                query.append_pair("comment", comment);
            }
        }
        url
    }
}

#[async_trait]
impl MissedCallReporter for HttpMissedCallReporter {
    async fn report_missed_call(&self, caller: &str, comment: Option<&str>) -> ClientResult<()> {
        let url = self.report_url(caller, comment);
        tracing::debug!("Reporting missed call: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::network(format!("missed call report rejected: {}", response.status())));
        }
        Ok(())
    }
}

/// Fire and forget a missed-call report
pub(crate) fn spawn_missed_call_report(
    reporter: Arc<dyn MissedCallReporter>,
    caller: String,
    comment: Option<String>,
) {
    tokio::spawn(async move {
        if let Err(e) = reporter.report_missed_call(&caller, comment.as_deref()).await {
            tracing::warn!("Missed call report for {} failed: {}", caller, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_url() {
        let reporter = HttpMissedCallReporter::new("https://trac.example.org/janus/").unwrap();
        assert_eq!(reporter.endpoint().as_str(), "https://trac.example.org/janus/missedcall");

        let url = reporter.report_url("bob", Some("about ticket #12"));
        assert_eq!(
            url.as_str(),
            "https://trac.example.org/janus/missedcall?caller=bob&comment=about+ticket+%2312"
        );
        assert_eq!(reporter.report_url("bob", None).query(), Some("caller=bob"));
    }

    #[test]
    fn test_invalid_event_uri() {
        assert!(matches!(
            HttpMissedCallReporter::new("nowhere"),
            Err(ClientError::Configuration { .. })
        ));
    }

    #[test]
    fn test_log_notifier_closes_once() {
        let mut notification = LogNotifier.notify("Incoming call", "Incoming call from bob!", None).unwrap();
        notification.close();
        notification.close();
        assert!(NoopNotifier.notify("a", "b", None).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_reporter_fails_softly() {
        let reporter = HttpMissedCallReporter::new("http://127.0.0.1:9").unwrap();
        assert!(reporter.report_missed_call("bob", None).await.is_err());
    }
}
