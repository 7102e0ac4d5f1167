use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam between the feed client and the transport, so tests and wrappers can
/// stand in for `reqwest`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
