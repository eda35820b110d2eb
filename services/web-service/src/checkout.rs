use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct CheckoutConfig {
    pub api_base: String,
    pub secret_key: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: Option<String>,
    pub client_reference_id: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug)]
pub struct CheckoutError {
    pub status: Option<u16>,
    pub body: String,
}

/// Stripe Checkout Sessions over the REST API.
#[derive(Clone)]
pub struct CheckoutClient {
    client: reqwest::Client,
    config: CheckoutConfig,
}

impl CheckoutClient {
    pub fn new(config: CheckoutConfig, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("build checkout client failed: {err}"))?;
        Ok(Self { client, config })
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    pub async fn create_session(
        &self,
        audit_id: &str,
        email: Option<&str>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("line_items[0][price]", self.config.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("client_reference_id", audit_id.to_string()),
            ("metadata[audit_id]", audit_id.to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
        ];
        if let Some(email) = email {
            form.push(("customer_email", email.to_string()));
        }

        let request = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .form(&form);
        self.send(request).await
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, CheckoutError> {
        let request = self
            .client
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.config.secret_key);
        self.send(request).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<CheckoutSession, CheckoutError> {
        let response = request.send().await.map_err(|err| CheckoutError {
            status: None,
            body: format!("payment provider unreachable: {err}"),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckoutError {
                status: Some(status.as_u16()),
                body,
            });
        }
        response.json().await.map_err(|err| CheckoutError {
            status: None,
            body: format!("decode checkout session failed: {err}"),
        })
    }
}
