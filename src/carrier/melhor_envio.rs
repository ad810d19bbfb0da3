use super::types::*;
use super::CarrierClient;
use crate::config::CarrierConfig;
use crate::errors::{CarrierApiError, ServiceError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// reqwest-backed client for the Melhor Envio v2 API
#[derive(Clone)]
pub struct MelhorEnvioClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for MelhorEnvioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MelhorEnvioClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MelhorEnvioClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, CarrierApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CarrierApiError::new("carrier token contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| CarrierApiError::new("carrier user agent is not a valid header"))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(CarrierApiError::from)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client from configuration. Fails when no carrier token is set.
    pub fn from_config(config: &CarrierConfig) -> Result<Self, ServiceError> {
        let token = config.bearer_token()?;
        Ok(Self::new(
            config.base_url(),
            token,
            &config.user_agent,
            config.timeout(),
        )?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, CarrierApiError> {
        let response = request.send().await.map_err(|e| {
            CarrierApiError::new(format!("carrier {} request failed: {}", operation, e))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CarrierApiError::with_status(
                format!("failed to read carrier {} response: {}", operation, e),
                status.as_u16(),
                None,
            )
        })?;

        if !status.is_success() {
            let message = extract_error_message(&body, operation);
            warn!(operation, status = status.as_u16(), %message, "Carrier rejected request");
            return Err(CarrierApiError::with_status(
                message,
                status.as_u16(),
                Some(body),
            ));
        }

        debug!(operation, status = status.as_u16(), "Carrier request succeeded");
        serde_json::from_str(&body).map_err(|e| {
            CarrierApiError::with_status(
                format!("unexpected carrier {} response: {}", operation, e),
                status.as_u16(),
                Some(body),
            )
        })
    }
}

/// Most specific human-readable message in a carrier error body.
///
/// Lookup order: first per-field validation message (`errors.<field>[0]`),
/// then `message`, then `error`, then a generic message naming the operation.
pub fn extract_error_message(body: &str, operation: &str) -> String {
    let generic = || format!("carrier {} request failed", operation);
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return generic();
    };

    if let Some(errors) = json.get("errors").and_then(Value::as_object) {
        let field_message = errors.values().find_map(|value| match value {
            Value::Array(messages) => messages.iter().find_map(Value::as_str),
            Value::String(message) => Some(message.as_str()),
            _ => None,
        });
        if let Some(message) = field_message {
            return message.to_string();
        }
    }

    ["message", "error"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(generic)
}

/// The cart endpoint takes an array of entries but answers with the bare
/// created entry; some sandbox builds answer with an array instead.
#[derive(Deserialize)]
#[serde(untagged)]
enum CartResponse {
    Single(CartEntry),
    Many(Vec<CartEntry>),
}

impl CartResponse {
    fn into_entry(self) -> Result<CartEntry, CarrierApiError> {
        match self {
            CartResponse::Single(entry) => Ok(entry),
            CartResponse::Many(entries) => entries
                .into_iter()
                .next()
                .ok_or_else(|| CarrierApiError::new("carrier cart response contained no entries")),
        }
    }
}

#[async_trait]
impl CarrierClient for MelhorEnvioClient {
    #[instrument(skip(self))]
    async fn get_order(&self, carrier_order_id: &str) -> Result<CarrierOrderInfo, CarrierApiError> {
        let request = self
            .http
            .get(self.url(&format!("/me/orders/{}", carrier_order_id)));
        self.send(request, "order lookup").await
    }

    #[instrument(skip(self, request))]
    async fn calculate_shipping(
        &self,
        request: &QuoteRequest,
    ) -> Result<Vec<ShippingQuote>, CarrierApiError> {
        let request = self
            .http
            .post(self.url("/me/shipment/calculate"))
            .json(request);
        self.send(request, "quote").await
    }

    #[instrument(skip(self, request), fields(service = request.service))]
    async fn add_to_cart(&self, request: &CartRequest) -> Result<CartEntry, CarrierApiError> {
        let request = self
            .http
            .post(self.url("/me/cart"))
            .json(std::slice::from_ref(request));
        let response: CartResponse = self.send(request, "cart").await?;
        response.into_entry()
    }

    #[instrument(skip(self))]
    async fn checkout(&self, order_ids: &[String]) -> Result<CheckoutResponse, CarrierApiError> {
        let request = self
            .http
            .post(self.url("/me/shipment/checkout"))
            .json(&OrderIds { orders: order_ids });
        self.send(request, "checkout").await
    }

    #[instrument(skip(self))]
    async fn generate_labels(&self, order_ids: &[String]) -> Result<Value, CarrierApiError> {
        let request = self
            .http
            .post(self.url("/me/shipment/generate"))
            .json(&OrderIds { orders: order_ids });
        self.send(request, "label generation").await
    }

    #[instrument(skip(self))]
    async fn print_labels(&self, order_ids: &[String]) -> Result<LabelPrint, CarrierApiError> {
        let request = self
            .http
            .post(self.url("/me/shipment/print"))
            .json(&OrderIds { orders: order_ids });
        self.send(request, "label print").await
    }
}
