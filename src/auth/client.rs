//! HTTP authorization client

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{AuthAction, Authorizer, UrlTemplate};
use crate::config::BadgeAuthConfig;
use crate::error::{AppError, Result};

/// Longest refusal reason kept from a response body
const MAX_REASON_BYTES: usize = 256;

/// Authorizer that POSTs to the configured URL template
pub struct HttpAuthorizer {
    client: reqwest::Client,
    template: UrlTemplate,
    usage_minutes: u32,
}

impl HttpAuthorizer {
    /// Build the client from the `badge_auth` section
    pub fn new(config: &BadgeAuthConfig) -> Result<Self> {
        let template = UrlTemplate::parse(&config.url_template)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            template,
            usage_minutes: config.usage_duration_minutes,
        })
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn authorize(&self, badge_id: &str, action: AuthAction) -> Result<()> {
        let url = self.template.expand(badge_id, action, self.usage_minutes);
        debug!("Authorizing badge {} ({})", badge_id, action);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/plain")
            .body("")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = match response.bytes().await {
            Ok(body) => {
                let end = body.len().min(MAX_REASON_BYTES);
                String::from_utf8_lossy(&body[..end]).trim().to_string()
            }
            Err(_) => "(can't decode body)".to_string(),
        };

        Err(AppError::AuthDenied {
            status: status.as_u16(),
            reason,
        })
    }
}
