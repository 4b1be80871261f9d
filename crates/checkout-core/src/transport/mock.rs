//! Mock Transport
//!
//! Scripted HTTP transport for tests and demos. Routes match on a URL
//! fragment; every request is recorded so tests can count calls.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

type Reply = Result<HttpResponse, TransportError>;
type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

struct Route {
    fragment: String,
    handler: Handler,
}

/// Mock transport with scripted routes
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request whose URL contains `fragment`
    #[must_use]
    pub fn route<F>(mut self, fragment: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Reply + Send + Sync + 'static,
    {
        self.routes.push(Route {
            fragment: fragment.into(),
            handler: Box::new(handler),
        });
        self
    }

    /// Answer with the given replies in order, repeating the last one
    #[must_use]
    pub fn route_sequence(self, fragment: impl Into<String>, replies: Vec<Reply>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        self.route(fragment, move |_| {
            let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
            match queue.len() {
                0 => Err(TransportError::Other("mock sequence is empty".into())),
                1 => queue[0].clone(),
                _ => queue.pop_front().unwrap_or_else(|| {
                    Err(TransportError::Other("mock sequence is empty".into()))
                }),
            }
        })
    }

    /// Delay every reply (uses tokio time, so paused clocks apply)
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All recorded requests
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose URL contains `fragment`
    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.routes
            .iter()
            .find(|route| request.url.contains(&route.fragment))
            .map_or_else(
                || Err(TransportError::Connect(format!("no mock route for {}", request.url))),
                |route| (route.handler)(&request),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let transport = MockTransport::new().route_sequence(
            "/x",
            vec![
                Ok(HttpResponse::new(500, "")),
                Ok(HttpResponse::new(200, "done")),
            ],
        );

        let first = transport.execute(HttpRequest::get("http://h/x")).await.unwrap();
        let second = transport.execute(HttpRequest::get("http://h/x")).await.unwrap();
        let third = transport.execute(HttpRequest::get("http://h/x")).await.unwrap();

        assert_eq!(first.status, 500);
        assert_eq!(second.body, "done");
        assert_eq!(third.body, "done");
        assert_eq!(transport.calls_to("/x"), 3);
    }

    #[tokio::test]
    async fn test_unrouted_is_connect_error() {
        let transport = MockTransport::new();
        let result = transport.execute(HttpRequest::get("http://h/none")).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
