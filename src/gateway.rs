// src/gateway.rs
//! Checkout sessions on the Stripe REST API.
use crate::config::Config;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

const DESCRIPTION_LIMIT: usize = 500;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Paid,
    Expired,
    Open,
}

impl CheckoutSession {
    pub fn outcome(&self) -> SessionOutcome {
        if self.payment_status.as_deref() == Some("paid") {
            SessionOutcome::Paid
        } else if self.status.as_deref() == Some("expired") {
            SessionOutcome::Expired
        } else {
            SessionOutcome::Open
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
        course_id: Uuid,
    ) -> Result<Product, GatewayError>;

    async fn create_price(&self, product_id: &str, unit_amount: i64) -> Result<Price, GatewayError>;

    async fn create_session(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}

/// Major currency units to the gateway's minor units.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn truncate_description(text: &str) -> &str {
    match text.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
    currency: String,
}

impl StripeClient {
    pub fn new(api_url: &str, secret_key: &str, currency: &str) -> Self {
        StripeClient {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.stripe_api_url,
            &config.stripe_secret_key,
            &config.stripe_currency,
        )
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn pair(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
        course_id: Uuid,
    ) -> Result<Product, GatewayError> {
        let mut form = vec![pair("name", name), pair("metadata[course_id]", course_id)];
        if let Some(text) = description.filter(|d| !d.is_empty()) {
            form.push(pair("description", truncate_description(text)));
        }
        let product: Product = self.post_form("/v1/products", &form).await?;
        tracing::info!("Created gateway product {} for course {}", product.id, course_id);
        Ok(product)
    }

    async fn create_price(&self, product_id: &str, unit_amount: i64) -> Result<Price, GatewayError> {
        let form = vec![
            pair("product", product_id),
            pair("unit_amount", unit_amount),
            pair("currency", &self.currency),
        ];
        self.post_form("/v1/prices", &form).await
    }

    async fn create_session(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = vec![
            pair("payment_method_types[0]", "card"),
            pair("line_items[0][price]", price_id),
            pair("line_items[0][quantity]", 1),
            pair("mode", "payment"),
            pair("success_url", success_url),
            pair("cancel_url", cancel_url),
        ];
        self.post_form("/v1/checkout/sessions", &form).await
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::decode(response).await
    }
}
