//! Mock HTTP server setup for tests that go through the real reqwest transport.

use campus_client::{ApiFamily, BearerTokenProvider, CacheClient, StaticOrigin};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// A client for `family` pointed at the mock server, with the default reqwest transport.
    pub fn create_test_client(
        &self,
        family: ApiFamily,
        token: Arc<BearerTokenProvider>,
    ) -> campus_client::Result<CacheClient> {
        CacheClient::builder()
            .family(family)
            .origin_resolver(Arc::new(StaticOrigin::new(&self.base_url)))
            .header_provider(token)
            .ignore_env()
            .build()
    }

    /// Create a mock for a successful JSON response
    pub async fn mock_json_response(
        &self,
        method: &str,
        path: &str,
        status: usize,
        body: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock answering with an HTML page, as a tunnel warning or a web app would
    pub async fn mock_html_page(&self, path: &str, page: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(page)
            .create_async()
            .await
    }
}
