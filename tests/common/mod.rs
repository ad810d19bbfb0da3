#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::{json, Value};
use storefront_logistics::{
    app_router,
    carrier::{
        CarrierClient, CarrierOrderInfo, CartEntry, CartRequest, CheckoutResponse, LabelPrint,
        Purchase, QuoteRequest, ShippingQuote,
    },
    config::AppConfig,
    db,
    entities::{address, order, order_item, shipment, OrderStatus},
    errors::CarrierApiError,
    AppState,
};
use tokio::sync::Notify;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Fresh in-memory SQLite database with migrations applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let pool = Database::connect(opt).await.expect("connect to sqlite");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

pub async fn seed_address(db: &DatabaseConnection, postal_code: &str) -> address::Model {
    address::ActiveModel {
        recipient_name: Set("João Pereira".into()),
        phone: Set(Some("11977776666".into())),
        document: Set(Some("98765432100".into())),
        street: Set("Rua Augusta".into()),
        number: Set("1500".into()),
        complement: Set(None),
        neighborhood: Set("Consolação".into()),
        city: Set("São Paulo".into()),
        state: Set("SP".into()),
        postal_code: Set(postal_code.into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert address")
}

pub async fn seed_order(
    db: &DatabaseConnection,
    id: i32,
    status: OrderStatus,
    address_id: Option<i32>,
) -> order::Model {
    order::ActiveModel {
        id: Set(id),
        status: Set(status),
        shipping_tracking_code: Set(None),
        customer_email: Set(Some("joao@example.com".into())),
        address_id: Set(address_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert order")
}

pub async fn seed_item(
    db: &DatabaseConnection,
    order_id: i32,
    name: &str,
    unit_price: f64,
    quantity: i32,
) -> order_item::Model {
    order_item::ActiveModel {
        order_id: Set(order_id),
        product_id: Set(10),
        product_name: Set(name.into()),
        unit_price: Set(unit_price),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert order item")
}

pub async fn seed_shipment(
    db: &DatabaseConnection,
    order_id: i32,
    carrier_order_id: &str,
    status: &str,
) -> shipment::Model {
    shipment::ActiveModel {
        order_id: Set(order_id),
        carrier_order_id: Set(Some(carrier_order_id.into())),
        status: Set(status.into()),
        tracking_code: Set(None),
        protocol: Set(None),
        service_id: Set(Some(1)),
        service_name: Set(Some("PAC".into())),
        carrier: Set(Some("Correios".into())),
        posted: Set(false),
        posted_at: Set(None),
        delivered: Set(false),
        delivered_at: Set(None),
        canceled: Set(false),
        canceled_at: Set(None),
        label_url: Set(None),
        price: Set(18.5),
        discount: Set(0.0),
        final_price: Set(18.5),
        delivery_time: Set(Some(6)),
        paid: Set(true),
        error: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert shipment")
}

pub fn carrier_order(status: &str, tracking: Option<&str>) -> CarrierOrderInfo {
    CarrierOrderInfo {
        status: Some(status.into()),
        tracking: tracking.map(str::to_string),
        ..Default::default()
    }
}

pub fn quote(id: i32, name: &str, price: &str, error: Option<&str>) -> ShippingQuote {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "price": price,
        "discount": "0.00",
        "delivery_time": 5,
        "delivery_range": { "min": 3, "max": 7 },
        "company": { "id": 1, "name": "Correios" },
        "error": error,
    }))
    .expect("valid quote json")
}

/// Hand-scripted carrier: answers from in-memory fixtures and counts calls.
#[derive(Default)]
pub struct ScriptedCarrier {
    orders: Mutex<HashMap<String, CarrierOrderInfo>>,
    quotes: Mutex<Vec<ShippingQuote>>,
    cart_requests: Mutex<Vec<CartRequest>>,
    fail_checkout: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    pub get_order_calls: AtomicUsize,
    pub quote_calls: AtomicUsize,
    pub cart_calls: AtomicUsize,
    pub checkout_calls: AtomicUsize,
}

impl ScriptedCarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_order(&self, carrier_order_id: &str, info: CarrierOrderInfo) {
        self.orders
            .lock()
            .unwrap()
            .insert(carrier_order_id.to_string(), info);
    }

    pub fn set_quotes(&self, quotes: Vec<ShippingQuote>) {
        *self.quotes.lock().unwrap() = quotes;
    }

    pub fn fail_checkout(&self) {
        self.fail_checkout.store(true, Ordering::SeqCst);
    }

    /// Makes every `get_order` wait for one `notify_one` on the returned handle.
    pub fn hold_order_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn cart_requests(&self) -> Vec<CartRequest> {
        self.cart_requests.lock().unwrap().clone()
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CarrierClient for ScriptedCarrier {
    async fn get_order(&self, carrier_order_id: &str) -> Result<CarrierOrderInfo, CarrierApiError> {
        self.get_order_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.orders
            .lock()
            .unwrap()
            .get(carrier_order_id)
            .cloned()
            .ok_or_else(|| {
                CarrierApiError::with_status(
                    format!("order {} not found", carrier_order_id),
                    404,
                    None,
                )
            })
    }

    async fn calculate_shipping(
        &self,
        _request: &QuoteRequest,
    ) -> Result<Vec<ShippingQuote>, CarrierApiError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.quotes.lock().unwrap().clone())
    }

    async fn add_to_cart(&self, request: &CartRequest) -> Result<CartEntry, CarrierApiError> {
        let n = self.cart_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.cart_requests.lock().unwrap().push(request.clone());
        Ok(CartEntry {
            id: format!("ME-RET-{}", n),
            protocol: Some(format!("ORD-2024{:04}", n)),
            status: Some("pending".into()),
        })
    }

    async fn checkout(&self, order_ids: &[String]) -> Result<CheckoutResponse, CarrierApiError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(CarrierApiError::with_status(
                "Saldo insuficiente",
                422,
                Some(r#"{"message":"Saldo insuficiente"}"#.into()),
            ));
        }
        Ok(CheckoutResponse {
            purchase: Purchase {
                id: Some("purchase-1".into()),
                protocol: order_ids.first().map(|id| format!("PUR-{}", id)),
                total: None,
                status: Some("paid".into()),
            },
        })
    }

    async fn generate_labels(&self, order_ids: &[String]) -> Result<Value, CarrierApiError> {
        let mut map = serde_json::Map::new();
        for id in order_ids {
            map.insert(id.clone(), json!({ "status": true, "message": "Envio gerado" }));
        }
        Ok(Value::Object(map))
    }

    async fn print_labels(&self, order_ids: &[String]) -> Result<LabelPrint, CarrierApiError> {
        Ok(LabelPrint {
            url: order_ids
                .first()
                .map(|id| format!("https://labels.example.com/{}.pdf", id)),
        })
    }
}

/// Router plus state over an in-memory database and a scripted carrier.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub carrier: Arc<ScriptedCarrier>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = setup_db().await;
        let carrier = ScriptedCarrier::new();

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.admin_api_token = Some(ADMIN_TOKEN.to_string());
        cfg.sync.candidate_delay_ms = 0;

        let state = AppState::new(db.clone(), cfg, carrier.clone());
        let router = app_router(state.clone());

        Self {
            router,
            state,
            db,
            carrier,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::empty()).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    pub async fn request_authenticated(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = self.request(method, uri, Some(ADMIN_TOKEN)).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
