mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront_logistics::{
    entities::{order, shipment, OrderStatus},
    errors::ServiceError,
};

use common::{carrier_order, quote, seed_address, seed_item, seed_order, TestApp};

async fn seed_return_order(app: &TestApp, id: i32) {
    let address = seed_address(&app.db, "01001-000").await;
    seed_order(&app.db, id, OrderStatus::ReturnApproved, Some(address.id)).await;
    seed_item(&app.db, id, "Boneca de pano", 49.9, 2).await;
    seed_item(&app.db, id, "Quebra-cabeça 500 peças", 35.0, 1).await;
}

#[tokio::test]
async fn approved_return_buys_pac_label_and_advances_order() {
    let app = TestApp::new().await;
    seed_return_order(&app, 800).await;
    app.carrier.set_quotes(vec![
        quote(2, "SEDEX", "41.30", None),
        quote(1, "PAC", "22.50", None),
        quote(17, "Mini Envios", "12.00", Some("Dimensões excedem o limite")),
    ]);
    app.carrier
        .set_order("ME-RET-1", carrier_order("pending", Some("OK123456789BR")));

    let result = app.state.return_labels.generate(800).await.unwrap();

    assert!(result.success);
    assert_eq!(result.shipment.service_id, Some(1));
    assert_eq!(result.shipment.service_name.as_deref(), Some("PAC"));
    assert_eq!(result.shipment.carrier_order_id.as_deref(), Some("ME-RET-1"));
    assert_eq!(result.shipment.price, 22.5);
    assert_eq!(result.shipment.delivery_time, Some(7));
    assert!(result.shipment.paid);
    assert_eq!(
        result.label_url.as_deref(),
        Some("https://labels.example.com/ME-RET-1.pdf")
    );
    assert_eq!(result.tracking_code.as_deref(), Some("OK123456789BR"));

    let cart = app.carrier.cart_requests();
    assert_eq!(cart.len(), 1);
    let cart = &cart[0];
    assert_eq!(cart.service, 1);
    assert_eq!(cart.from.postal_code, "01001000");
    assert_eq!(cart.to.postal_code, "01310100");
    assert_eq!(cart.products.len(), 2);
    assert_eq!(cart.volumes.len(), 1);
    assert_eq!(cart.volumes[0].weight, dec!(0.9));
    assert_eq!(cart.options.insurance_value, dec!(134.80));
    assert!(cart.options.reverse);

    let order = order::Entity::find_by_id(800)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::ReturnLabelGenerated);
    assert_eq!(order.shipping_tracking_code.as_deref(), Some("OK123456789BR"));
}

#[tokio::test]
async fn failed_checkout_leaves_no_trace() {
    let app = TestApp::new().await;
    seed_return_order(&app, 810).await;
    app.carrier.set_quotes(vec![quote(1, "PAC", "22.50", None)]);
    app.carrier.fail_checkout();

    let err = app.state.return_labels.generate(810).await.unwrap_err();
    assert_matches!(err, ServiceError::CarrierApiError(ref e) if e.status == Some(422));

    assert_eq!(app.carrier.calls(&app.carrier.checkout_calls), 1);
    assert_eq!(
        shipment::Entity::find().count(app.db.as_ref()).await.unwrap(),
        0
    );
    let order = order::Entity::find_by_id(810)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::ReturnApproved);
}

#[tokio::test]
async fn second_request_after_success_is_rejected_before_any_carrier_call() {
    let app = TestApp::new().await;
    seed_return_order(&app, 820).await;
    app.carrier.set_quotes(vec![quote(1, "PAC", "22.50", None)]);
    app.carrier
        .set_order("ME-RET-1", carrier_order("pending", None));

    app.state.return_labels.generate(820).await.unwrap();
    let err = app.state.return_labels.generate(820).await.unwrap_err();

    assert_matches!(err, ServiceError::PreconditionError(_));
    assert_eq!(app.carrier.calls(&app.carrier.quote_calls), 1);
    assert_eq!(app.carrier.calls(&app.carrier.cart_calls), 1);
    assert_eq!(
        shipment::Entity::find().count(app.db.as_ref()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn only_unavailable_quotes_fail_with_no_shipping_option() {
    let app = TestApp::new().await;
    seed_return_order(&app, 830).await;
    app.carrier.set_quotes(vec![
        quote(1, "PAC", "22.50", Some("Serviço indisponível para o trecho")),
        quote(2, "SEDEX", "41.30", Some("Serviço indisponível para o trecho")),
    ]);

    let err = app.state.return_labels.generate(830).await.unwrap_err();

    assert_matches!(err, ServiceError::NoShippingOptionError(_));
    assert_eq!(app.carrier.calls(&app.carrier.cart_calls), 0);
}
