pub mod melhor_envio;
pub mod types;

use crate::entities::OrderStatus;
use crate::errors::CarrierApiError;
use async_trait::async_trait;
use std::fmt;

pub use melhor_envio::MelhorEnvioClient;
pub use types::*;

/// Typed access to the shipping carrier.
///
/// Every method maps to one carrier endpoint and fails with
/// [`CarrierApiError`] on transport errors, non-2xx responses and malformed
/// payloads.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn get_order(&self, carrier_order_id: &str) -> Result<CarrierOrderInfo, CarrierApiError>;

    async fn calculate_shipping(
        &self,
        request: &QuoteRequest,
    ) -> Result<Vec<ShippingQuote>, CarrierApiError>;

    /// Registers a single purchase intent and returns the created cart entry.
    async fn add_to_cart(&self, request: &CartRequest) -> Result<CartEntry, CarrierApiError>;

    async fn checkout(&self, order_ids: &[String]) -> Result<CheckoutResponse, CarrierApiError>;

    /// Asks the carrier to render labels. Rendering finishes asynchronously on
    /// the carrier side; the raw per-order status map is returned.
    async fn generate_labels(
        &self,
        order_ids: &[String],
    ) -> Result<serde_json::Value, CarrierApiError>;

    async fn print_labels(&self, order_ids: &[String]) -> Result<LabelPrint, CarrierApiError>;
}

/// Status vocabulary of the carrier. Note `canceled` with one `l`, unlike
/// the local [`OrderStatus::Cancelled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierStatus {
    Pending,
    Released,
    Posted,
    InTransit,
    Delivered,
    Canceled,
    Undelivered,
    Other(String),
}

impl CarrierStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => CarrierStatus::Pending,
            "released" => CarrierStatus::Released,
            "posted" => CarrierStatus::Posted,
            "in_transit" => CarrierStatus::InTransit,
            "delivered" => CarrierStatus::Delivered,
            "canceled" => CarrierStatus::Canceled,
            "undelivered" => CarrierStatus::Undelivered,
            other => CarrierStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CarrierStatus::Pending => "pending",
            CarrierStatus::Released => "released",
            CarrierStatus::Posted => "posted",
            CarrierStatus::InTransit => "in_transit",
            CarrierStatus::Delivered => "delivered",
            CarrierStatus::Canceled => "canceled",
            CarrierStatus::Undelivered => "undelivered",
            CarrierStatus::Other(raw) => raw,
        }
    }

    /// Local order status implied by this carrier status, if any.
    pub fn implied_order_status(&self) -> Option<OrderStatus> {
        match self {
            CarrierStatus::Delivered => Some(OrderStatus::Delivered),
            CarrierStatus::Posted | CarrierStatus::InTransit => Some(OrderStatus::Shipped),
            CarrierStatus::Canceled => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for CarrierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub Carrier {}

        #[async_trait]
        impl CarrierClient for Carrier {
            async fn get_order(&self, carrier_order_id: &str) -> Result<CarrierOrderInfo, CarrierApiError>;
            async fn calculate_shipping(&self, request: &QuoteRequest) -> Result<Vec<ShippingQuote>, CarrierApiError>;
            async fn add_to_cart(&self, request: &CartRequest) -> Result<CartEntry, CarrierApiError>;
            async fn checkout(&self, order_ids: &[String]) -> Result<CheckoutResponse, CarrierApiError>;
            async fn generate_labels(&self, order_ids: &[String]) -> Result<serde_json::Value, CarrierApiError>;
            async fn print_labels(&self, order_ids: &[String]) -> Result<LabelPrint, CarrierApiError>;
        }
    }
}
