//! Wire types for the Melhor Envio v2 API.
//!
//! Only the fields the logistics core reads are modelled; everything else the
//! carrier sends is ignored on deserialization.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CarrierCompany {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CarrierService {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<CarrierCompany>,
}

/// Carrier-side view of a purchased shipment (`GET /me/orders/{id}`).
///
/// Milestone timestamps are kept as the raw strings the carrier sends; they are
/// parsed by the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CarrierOrderInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracking: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub service: Option<CarrierService>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<String>,
    #[serde(default)]
    pub canceled_at: Option<String>,
}

impl CarrierOrderInfo {
    pub fn service_name(&self) -> Option<&str> {
        self.service.as_ref().and_then(|s| s.name.as_deref())
    }

    pub fn company_name(&self) -> Option<&str> {
        self.service
            .as_ref()
            .and_then(|s| s.company.as_ref())
            .and_then(|c| c.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostalCode {
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteProduct {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub length: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub weight: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub insurance_value: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShippingOptions {
    pub receipt: bool,
    pub own_hand: bool,
    pub reverse: bool,
}

/// Body of `POST /me/shipment/calculate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteRequest {
    pub from: PostalCode,
    pub to: PostalCode,
    pub products: Vec<QuoteProduct>,
    pub options: ShippingOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct DeliveryRange {
    #[serde(default)]
    pub min: Option<i32>,
    #[serde(default)]
    pub max: Option<i32>,
}

/// One entry of the quote list. The carrier reports unavailable services as
/// entries carrying only `error`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShippingQuote {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub delivery_time: Option<i32>,
    #[serde(default)]
    pub delivery_range: Option<DeliveryRange>,
    #[serde(default)]
    pub company: Option<CarrierCompany>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ShippingQuote {
    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }

    /// Upper bound of the delivery range, falling back to the flat delivery time
    pub fn max_delivery_days(&self) -> Option<i32> {
        self.delivery_range
            .and_then(|range| range.max)
            .or(self.delivery_time)
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company.as_ref().and_then(|c| c.name.as_deref())
    }
}

/// Sender or recipient block of a cart entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartParty {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub document: String,
    pub address: String,
    pub complement: String,
    pub number: String,
    pub district: String,
    pub city: String,
    pub state_abbr: String,
    pub country_id: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartProduct {
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unitary_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volume {
    pub height: u32,
    pub width: u32,
    pub length: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartOptions {
    #[serde(with = "rust_decimal::serde::float")]
    pub insurance_value: Decimal,
    pub receipt: bool,
    pub own_hand: bool,
    pub reverse: bool,
    pub non_commercial: bool,
}

/// Body of `POST /me/cart`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartRequest {
    pub service: i32,
    pub from: CartParty,
    pub to: CartParty,
    pub products: Vec<CartProduct>,
    pub volumes: Vec<Volume>,
    pub options: CartOptions,
}

/// Entry created in the carrier cart; `id` is the carrier order id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CartEntry {
    pub id: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of checkout, generate and print requests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIds<'a> {
    pub orders: &'a [String],
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Purchase {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckoutResponse {
    pub purchase: Purchase,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LabelPrint {
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quote_prices_accept_carrier_strings() {
        let raw = r#"[
            {"id": 2, "name": "SEDEX", "error": "peso excede limite"},
            {"id": 1, "name": "PAC", "price": "22.50", "discount": "1.20",
             "delivery_time": 8, "delivery_range": {"min": 6, "max": 9},
             "company": {"id": 1, "name": "Correios"}}
        ]"#;
        let quotes: Vec<ShippingQuote> = serde_json::from_str(raw).unwrap();

        assert!(!quotes[0].is_available());
        assert_eq!(quotes[1].price, Some(dec!(22.50)));
        assert_eq!(quotes[1].discount, Some(dec!(1.20)));
        assert_eq!(quotes[1].max_delivery_days(), Some(9));
        assert_eq!(quotes[1].company_name(), Some("Correios"));
    }

    #[test]
    fn order_info_tolerates_sparse_payloads() {
        let info: CarrierOrderInfo =
            serde_json::from_str(r#"{"status": "released", "tracking": null}"#).unwrap();
        assert_eq!(info.status.as_deref(), Some("released"));
        assert_eq!(info.service_name(), None);
        assert_eq!(info.company_name(), None);
    }

    #[test]
    fn money_fields_serialize_as_numbers() {
        let volume = Volume {
            height: 10,
            width: 20,
            length: 30,
            weight: dec!(0.9),
        };
        let json = serde_json::to_value(&volume).unwrap();
        assert_eq!(json["weight"], serde_json::json!(0.9));
    }
}
