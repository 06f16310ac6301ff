//! A scripted [`HttpClient`] for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use gcalkit_core::{CalendarError, CalendarResult};

use crate::http::{BoxFuture, HttpClient, HttpRequest, HttpResponse};

/// Replays queued responses in order and records every request it receives.
///
/// When the queue runs dry the client answers with a network error, so a test
/// that sends more requests than it scripted fails loudly.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<CalendarResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push(&self, response: HttpResponse) -> &Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    /// Queues a response with a plain body.
    pub fn push_status(&self, status: u16, body: &str) -> &Self {
        self.push(HttpResponse::new(status, body))
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(
            HttpResponse::new(status, body.to_string())
                .with_header("Content-Type", "application/json"),
        )
    }

    /// Queues a redirect to `location`.
    pub fn push_redirect(&self, status: u16, location: &str) -> &Self {
        self.push(HttpResponse::new(status, "").with_header("Location", location))
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: CalendarError) -> &Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of scripted responses not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl HttpClient for MockHttpClient {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>> {
        Box::pin(async move {
            let description = format!("{} {}", request.method, request.url);
            lock(&self.requests).push(request);
            lock(&self.responses).pop_front().unwrap_or_else(|| {
                Err(CalendarError::network(format!(
                    "no scripted response for {}",
                    description
                )))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcalkit_core::ErrorKind;
    use url::Url;

    #[tokio::test]
    async fn replays_in_order_and_records() {
        let mock = MockHttpClient::new();
        mock.push_status(200, "first").push_status(404, "second");

        let url = Url::parse("https://example.com/a").unwrap();
        let first = mock.execute(HttpRequest::get(url.clone())).await.unwrap();
        let second = mock.execute(HttpRequest::get(url)).await.unwrap();

        assert_eq!(first.body, "first");
        assert_eq!(second.status, 404);
        assert_eq!(mock.request_count(), 2);
        assert_eq!(mock.pending(), 0);
    }

    #[tokio::test]
    async fn empty_queue_is_network_error() {
        let mock = MockHttpClient::new();
        let url = Url::parse("https://example.com/a").unwrap();
        let err = mock.execute(HttpRequest::get(url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
