//! Blocking HTTP downloads with bounded exponential backoff.
//!
//! Each attempt's result is classified:
//! - 2xx: success, the body is returned
//! - 3xx / 4xx: the resource does not exist there, never retried
//! - 5xx, timeouts and transport errors: retried after `2^attempt` seconds
//!
//! The transport and the sleep are traits so tests can drive the retry loop
//! without a network or a real clock.

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Status code and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// Minimal blocking HTTP GET.
///
/// An `Err` means no response was received at all (timeout, DNS, reset);
/// any response, whatever its status, is an `Ok`.
pub trait HttpTransport: Send + Sync {
    /// Perform a GET request.
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, String>;
}

/// Real transport using a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Something that can wait between attempts.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of a logical fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server returned the resource.
    Success(Vec<u8>),
    /// The server says the resource does not exist (3xx or 4xx).
    Absent,
    /// Every attempt failed with a retryable error.
    Failed,
}

/// Classification of a single attempt.
#[derive(Debug)]
enum Attempt {
    Done(FetchOutcome),
    Retry(String),
}

fn classify(result: std::result::Result<HttpResponse, String>) -> Attempt {
    match result {
        Ok(response) => match response.status {
            200..=299 => Attempt::Done(FetchOutcome::Success(response.body)),
            300..=499 => Attempt::Done(FetchOutcome::Absent),
            status => Attempt::Retry(format!("server answered HTTP {}", status)),
        },
        Err(e) => Attempt::Retry(e),
    }
}

/// Delay before retrying after the `attempt`-th failure (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16))
}

/// HTTP fetcher with retry policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    max_attempts: u32,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Fetcher {
    /// Create a fetcher over any transport and sleeper.
    pub fn new(transport: Arc<dyn HttpTransport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            sleeper,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Create a fetcher using reqwest and real sleeps.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self::new(
            Arc::new(ReqwestTransport::new(timeout)?),
            Arc::new(ThreadSleeper),
        ))
    }

    /// Change the total number of attempts (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Total number of attempts per fetch.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Download `url`, retrying transient failures.
    ///
    /// `label` names the data source in log messages.
    pub fn fetch(&self, url: &str, label: &str) -> FetchOutcome {
        let mut attempt = 0;
        loop {
            match classify(self.transport.get(url)) {
                Attempt::Done(FetchOutcome::Absent) => {
                    tracing::debug!("Server said 'Not Found' for {}", url);
                    return FetchOutcome::Absent;
                }
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(reason) => {
                    tracing::debug!("Attempt {} on {} failed: {}", attempt + 1, url, reason);
                }
            }
            attempt += 1;
            if attempt >= self.max_attempts {
                tracing::warn!("{} server unreachable after {} attempts: {}", label, attempt, url);
                return FetchOutcome::Failed;
            }
            let delay = backoff_delay(attempt);
            tracing::info!(
                "{} server may be down or busy, new attempt in {} sec...",
                label,
                delay.as_secs()
            );
            self.sleeper.sleep(delay);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays a scripted sequence of results and records URLs.
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<HttpResponse, String>>>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<std::result::Result<HttpResponse, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn status(status: u16) -> std::result::Result<HttpResponse, String> {
            Ok(HttpResponse {
                status,
                body: Vec::new(),
            })
        }

        pub(crate) fn ok(body: Vec<u8>) -> std::result::Result<HttpResponse, String> {
            Ok(HttpResponse { status: 200, body })
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str) -> std::result::Result<HttpResponse, String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()))
        }
    }

    /// Sleeper that only records the requested delays.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn total(&self) -> Duration {
            self.delays.lock().unwrap().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn fetcher(script: Vec<std::result::Result<HttpResponse, String>>) -> (Fetcher, Arc<ScriptedTransport>, Arc<RecordingSleeper>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let sleeper = Arc::new(RecordingSleeper::default());
        let fetcher = Fetcher::new(transport.clone(), sleeper.clone());
        (fetcher, transport, sleeper)
    }

    #[test]
    fn test_success_after_server_errors() {
        let (fetcher, transport, sleeper) = fetcher(vec![
            ScriptedTransport::status(503),
            ScriptedTransport::status(503),
            ScriptedTransport::status(503),
            ScriptedTransport::ok(vec![1, 2, 3]),
        ]);

        let outcome = fetcher.fetch("http://example.com/a.zip", "test");
        assert_eq!(outcome, FetchOutcome::Success(vec![1, 2, 3]));
        assert_eq!(transport.request_count(), 4);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
        );
        assert_eq!(sleeper.total(), Duration::from_secs(14));
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let (fetcher, transport, sleeper) = fetcher(vec![ScriptedTransport::status(404)]);

        assert_eq!(fetcher.fetch("http://example.com/missing", "test"), FetchOutcome::Absent);
        assert_eq!(transport.request_count(), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_redirect_counts_as_absent() {
        let (fetcher, transport, _) = fetcher(vec![ScriptedTransport::status(302)]);
        assert_eq!(fetcher.fetch("http://example.com/moved", "test"), FetchOutcome::Absent);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let (fetcher, transport, sleeper) = fetcher(vec![
            Err("timed out".to_string()),
            ScriptedTransport::status(500),
            Err("connection reset".to_string()),
            ScriptedTransport::status(502),
            ScriptedTransport::status(503),
            ScriptedTransport::status(504),
            ScriptedTransport::ok(vec![9]),
        ]);

        assert_eq!(fetcher.fetch("http://example.com/busy", "test"), FetchOutcome::Failed);
        assert_eq!(transport.request_count(), 6);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 5);
        assert_eq!(sleeper.total(), Duration::from_secs(2 + 4 + 8 + 16 + 32));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let (fetcher, transport, sleeper) = fetcher(vec![ScriptedTransport::status(500)]);
        let fetcher = fetcher.with_max_attempts(0);
        assert_eq!(fetcher.max_attempts(), 1);
        assert_eq!(fetcher.fetch("http://example.com/x", "test"), FetchOutcome::Failed);
        assert_eq!(transport.request_count(), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(5), Duration::from_secs(32));
    }
}
