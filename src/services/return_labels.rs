use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::carrier::{
    CarrierClient, CartOptions, CartParty, CartProduct, CartRequest, PostalCode, QuoteProduct,
    QuoteRequest, ShippingOptions, ShippingQuote, Volume,
};
use crate::config::ReturnDepotConfig;
use crate::entities::{address, shipment, OrderStatus};
use crate::errors::ServiceError;
use crate::repositories::{NewReturnShipment, ReturnOrder, ShipmentRepository};

/// Package used to quote every return, whatever the products are.
///
/// These are placeholder measures, not per-product data. Replace with real
/// product dimensions once the catalog carries them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackageDimensions {
    pub width_cm: u32,
    pub height_cm: u32,
    pub length_cm: u32,
    pub unit_weight_kg: Decimal,
}

pub const RETURN_PACKAGE: PackageDimensions = PackageDimensions {
    width_cm: 20,
    height_cm: 10,
    length_cm: 30,
    // 0.3 kg
    unit_weight_kg: Decimal::from_parts(3, 0, 0, false, 1),
};

/// Service picked when the carrier offers it without error
pub const PREFERRED_SERVICE_NAME: &str = "PAC";

const COUNTRY_ID: &str = "BR";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnLabelResult {
    pub success: bool,
    pub shipment: shipment::Model,
    pub label_url: Option<String>,
    pub tracking_code: Option<String>,
}

/// Buys reverse-logistics shipping for an order approved for return.
///
/// Carrier steps run in sequence: quote, cart, checkout, generate, print,
/// order lookup. Nothing is written locally until all of them have finished;
/// only the print step may fail without aborting.
#[derive(Clone)]
pub struct ReturnLabelService {
    repository: ShipmentRepository,
    carrier: Arc<dyn CarrierClient>,
    depot: ReturnDepotConfig,
}

impl ReturnLabelService {
    pub fn new(
        repository: ShipmentRepository,
        carrier: Arc<dyn CarrierClient>,
        depot: ReturnDepotConfig,
    ) -> Self {
        Self {
            repository,
            carrier,
            depot,
        }
    }

    #[instrument(skip(self))]
    pub async fn generate(&self, order_id: i32) -> Result<ReturnLabelResult, ServiceError> {
        let result = self.run(order_id).await;
        match &result {
            Ok(res) => {
                counter!("return_labels.generated", 1);
                info!(
                    order_id,
                    shipment_id = res.shipment.id,
                    label_ready = res.label_url.is_some(),
                    "Return label generated"
                );
            }
            Err(e) => {
                counter!("return_labels.failed", 1);
                warn!(order_id, error = %e, "Return label generation failed");
            }
        }
        result
    }

    async fn run(&self, order_id: i32) -> Result<ReturnLabelResult, ServiceError> {
        let ret = self.repository.load_return_order(order_id).await?;

        if ret.order.status != OrderStatus::ReturnApproved {
            return Err(ServiceError::PreconditionError(format!(
                "Order {} is not approved for return (status: {})",
                order_id, ret.order.status
            )));
        }
        let address = ret.address.as_ref().ok_or_else(|| {
            ServiceError::MissingDataError(format!("Order {} has no delivery address", order_id))
        })?;
        if ret.items.is_empty() {
            return Err(ServiceError::MissingDataError(format!(
                "Order {} has no items to return",
                order_id
            )));
        }
        if let Some(item) = ret.items.iter().find(|item| item.quantity < 1) {
            return Err(ServiceError::MissingDataError(format!(
                "Order {} item {} has invalid quantity {}",
                order_id, item.id, item.quantity
            )));
        }
        let customer_postal_code = normalize_postal_code(&address.postal_code).ok_or_else(|| {
            ServiceError::MissingDataError(format!(
                "Order {} address has no valid postal code",
                order_id
            ))
        })?;

        // 1. quote
        let quote_request = build_quote_request(&ret, &customer_postal_code, &self.depot);
        let quotes = self.carrier.calculate_shipping(&quote_request).await?;
        let quote = select_quote(&quotes)?;
        info!(order_id, service = %quote.name, service_id = quote.id, "Selected return service");

        // 2. cart
        let cart_request = build_cart_request(&ret, address, &customer_postal_code, quote, &self.depot);
        let cart_entry = self.carrier.add_to_cart(&cart_request).await?;
        let carrier_order_ids = vec![cart_entry.id.clone()];

        // 3. checkout
        let checkout = self.carrier.checkout(&carrier_order_ids).await?;
        let protocol = checkout.purchase.protocol.or(cart_entry.protocol);

        // 4. generate
        let generation = self.carrier.generate_labels(&carrier_order_ids).await?;
        info!(order_id, carrier_order_id = %cart_entry.id, response = %generation, "Label generation requested");

        // 5. print; the label may not be rendered yet
        let label_url = match self.carrier.print_labels(&carrier_order_ids).await {
            Ok(print) => print.url.filter(|url| !url.is_empty()),
            Err(e) => {
                warn!(order_id, carrier_order_id = %cart_entry.id, error = %e, "Label URL not available yet");
                None
            }
        };

        // 6. tracking
        let carrier_order = self.carrier.get_order(&cart_entry.id).await?;
        let tracking_code = carrier_order.tracking.filter(|code| !code.trim().is_empty());

        let price = quote.price.unwrap_or_default();
        let discount = quote.discount.unwrap_or_default();
        let shipment = self
            .repository
            .commit_return_label(NewReturnShipment {
                order_id,
                carrier_order_id: cart_entry.id,
                protocol,
                service_id: quote.id,
                service_name: quote.name.clone(),
                carrier: quote.company_name().map(str::to_string),
                price: to_f64(price),
                discount: to_f64(discount),
                final_price: to_f64(price - discount),
                delivery_time: quote.max_delivery_days(),
                tracking_code: tracking_code.clone(),
                label_url: label_url.clone(),
            })
            .await?;

        Ok(ReturnLabelResult {
            success: true,
            shipment,
            label_url,
            tracking_code,
        })
    }
}

/// Preferred service if offered without error, else the first error-free quote.
pub fn select_quote(quotes: &[ShippingQuote]) -> Result<&ShippingQuote, ServiceError> {
    quotes
        .iter()
        .find(|q| q.is_available() && q.name == PREFERRED_SERVICE_NAME)
        .or_else(|| quotes.iter().find(|q| q.is_available()))
        .ok_or_else(|| {
            let reasons: Vec<String> = quotes
                .iter()
                .filter_map(|q| q.error.as_ref().map(|e| format!("{}: {}", q.name, e)))
                .collect();
            let detail = if reasons.is_empty() {
                "carrier returned no quotes".to_string()
            } else {
                reasons.join("; ")
            };
            ServiceError::NoShippingOptionError(format!(
                "No shipping option available for this return ({})",
                detail
            ))
        })
}

/// Customer ships back from the delivery address to the merchant depot.
pub fn build_quote_request(
    ret: &ReturnOrder,
    customer_postal_code: &str,
    depot: &ReturnDepotConfig,
) -> QuoteRequest {
    let products = ret
        .items
        .iter()
        .map(|item| {
            let quantity = quantity(item.quantity);
            QuoteProduct {
                id: item.product_id.to_string(),
                width: RETURN_PACKAGE.width_cm,
                height: RETURN_PACKAGE.height_cm,
                length: RETURN_PACKAGE.length_cm,
                weight: RETURN_PACKAGE.unit_weight_kg,
                insurance_value: money(item.unit_price) * Decimal::from(quantity),
                quantity,
            }
        })
        .collect();

    QuoteRequest {
        from: PostalCode {
            postal_code: customer_postal_code.to_string(),
        },
        to: PostalCode {
            postal_code: normalize_postal_code(&depot.postal_code)
                .unwrap_or_else(|| depot.postal_code.clone()),
        },
        products,
        options: ShippingOptions {
            receipt: false,
            own_hand: false,
            reverse: true,
        },
    }
}

/// Single consolidated volume weighing the sum of all units.
pub fn build_cart_request(
    ret: &ReturnOrder,
    address: &address::Model,
    customer_postal_code: &str,
    quote: &ShippingQuote,
    depot: &ReturnDepotConfig,
) -> CartRequest {
    let mut total_weight = Decimal::ZERO;
    let mut insurance_value = Decimal::ZERO;
    let products = ret
        .items
        .iter()
        .map(|item| {
            let quantity = quantity(item.quantity);
            let unit_price = money(item.unit_price);
            total_weight += RETURN_PACKAGE.unit_weight_kg * Decimal::from(quantity);
            insurance_value += unit_price * Decimal::from(quantity);
            CartProduct {
                name: item.product_name.clone(),
                quantity,
                unitary_value: unit_price,
            }
        })
        .collect();

    let from = CartParty {
        name: address.recipient_name.clone(),
        phone: address.phone.clone().unwrap_or_default(),
        email: ret.order.customer_email.clone().unwrap_or_default(),
        document: address.document.clone().unwrap_or_default(),
        address: address.street.clone(),
        complement: address.complement.clone().unwrap_or_default(),
        number: address.number.clone(),
        district: address.neighborhood.clone(),
        city: address.city.clone(),
        state_abbr: address.state.to_uppercase(),
        country_id: COUNTRY_ID.to_string(),
        postal_code: customer_postal_code.to_string(),
    };

    let to = CartParty {
        name: depot.name.clone(),
        phone: depot.phone.clone(),
        email: depot.email.clone(),
        document: depot.document.clone(),
        address: depot.street.clone(),
        complement: depot.complement.clone(),
        number: depot.number.clone(),
        district: depot.district.clone(),
        city: depot.city.clone(),
        state_abbr: depot.state_abbr.to_uppercase(),
        country_id: COUNTRY_ID.to_string(),
        postal_code: normalize_postal_code(&depot.postal_code)
            .unwrap_or_else(|| depot.postal_code.clone()),
    };

    CartRequest {
        service: quote.id,
        from,
        to,
        products,
        volumes: vec![Volume {
            height: RETURN_PACKAGE.height_cm,
            width: RETURN_PACKAGE.width_cm,
            length: RETURN_PACKAGE.length_cm,
            weight: total_weight,
        }],
        options: CartOptions {
            insurance_value,
            receipt: false,
            own_hand: false,
            reverse: true,
            non_commercial: true,
        },
    }
}

/// Digits of a CEP, if it has exactly eight.
fn normalize_postal_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == 8).then_some(digits)
}

fn quantity(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

fn money(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default().round_dp(2)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
