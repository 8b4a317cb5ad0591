//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::errors::CoordinatorError;
use crate::utils::version_info;

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// HTTP client shared by the adapters, the health checker and the notifier
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, CoordinatorError> {
        let client = Client::builder()
            .user_agent(format!("deploy-coordinator/{}", version_info().version))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self { client })
    }

    /// POST a JSON body. Non-2xx statuses are returned, not raised.
    pub async fn post_json<B: Serialize>(
        &self,
        url: &Url,
        body: &B,
        timeout: Duration,
    ) -> Result<HttpReply, reqwest::Error> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let reply = read_reply(url, response).await?;
        if !reply.is_success() {
            error!("HTTP POST {} failed: {} - {}", url, reply.status, reply.body);
        }
        Ok(reply)
    }

    /// GET a URL. Non-2xx statuses are returned, not raised.
    pub async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpReply, reqwest::Error> {
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).timeout(timeout).send().await?;

        read_reply(url, response).await
    }
}

/// Read the body. A failed read is an error on a 2xx; on other statuses the
/// body is dropped and the status decides.
async fn read_reply(url: &Url, response: Response) -> Result<HttpReply, reqwest::Error> {
    let status = response.status();
    match response.text().await {
        Ok(body) => Ok(HttpReply { status, body }),
        Err(e) if status.is_success() => {
            warn!("Reading body from {} failed after {}: {}", url, status, e);
            Err(e)
        }
        Err(e) => {
            debug!("Discarding unreadable body from {} ({}): {}", url, status, e);
            Ok(HttpReply {
                status,
                body: String::new(),
            })
        }
    }
}
