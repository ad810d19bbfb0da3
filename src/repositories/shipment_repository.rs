use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, ModelTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::entities::{address, order, order_item, shipment, OrderStatus};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Order statuses that end reconciliation for a shipment that is not yet
/// flagged delivered. `canceled` is the carrier spelling, kept as stored.
const TERMINAL_ORDER_STATUSES: [&str; 2] = ["delivered", "canceled"];

/// Order columns reconciliation reads. The status is kept as stored so that
/// a value outside [`OrderStatus`] only affects its own order.
#[derive(Debug, Clone, PartialEq, FromQueryResult)]
pub struct CandidateOrder {
    pub id: i32,
    pub status: String,
    pub shipping_tracking_code: Option<String>,
}

impl CandidateOrder {
    /// `None` when the stored status is not one this service knows.
    pub fn known_status(&self) -> Option<OrderStatus> {
        OrderStatus::try_from_value(&self.status).ok()
    }
}

/// Shipment paired with its order, as seen by one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCandidate {
    pub shipment: shipment::Model,
    pub order: CandidateOrder,
}

/// Shipment fields changed by a reconciliation pass. `None` means untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipmentChanges {
    pub status: Option<String>,
    pub tracking_code: Option<String>,
    pub protocol: Option<String>,
    pub service_name: Option<String>,
    pub carrier: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl ShipmentChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the changed fields, for logging
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.tracking_code.is_some() {
            fields.push("tracking_code");
        }
        if self.protocol.is_some() {
            fields.push("protocol");
        }
        if self.service_name.is_some() {
            fields.push("service_name");
        }
        if self.carrier.is_some() {
            fields.push("carrier");
        }
        if self.posted_at.is_some() {
            fields.push("posted");
        }
        if self.delivered_at.is_some() {
            fields.push("delivered");
        }
        if self.canceled_at.is_some() {
            fields.push("canceled");
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub shipping_tracking_code: Option<String>,
}

impl OrderChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.shipping_tracking_code.is_none()
    }
}

/// Everything the return-label workflow reads about an order
#[derive(Debug, Clone)]
pub struct ReturnOrder {
    pub order: order::Model,
    pub address: Option<address::Model>,
    pub items: Vec<order_item::Model>,
}

/// Shipment row created once a return label has been purchased
#[derive(Debug, Clone, PartialEq)]
pub struct NewReturnShipment {
    pub order_id: i32,
    pub carrier_order_id: String,
    pub protocol: Option<String>,
    pub service_id: i32,
    pub service_name: String,
    pub carrier: Option<String>,
    pub price: f64,
    pub discount: f64,
    pub final_price: f64,
    pub delivery_time: Option<i32>,
    pub tracking_code: Option<String>,
    pub label_url: Option<String>,
}

/// Persistence for orders and their carrier shipments
#[derive(Debug, Clone)]
pub struct ShipmentRepository {
    base: BaseRepository,
}

impl ShipmentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Shipments purchased from the carrier whose lifecycle is not finished,
    /// most recent order first.
    pub async fn find_sync_candidates(&self) -> Result<Vec<SyncCandidate>, ServiceError> {
        let db = self.base.get_db();
        let shipments = shipment::Entity::find()
            .join(JoinType::InnerJoin, shipment::Relation::Order.def())
            .filter(shipment::Column::CarrierOrderId.is_not_null())
            .filter(
                Condition::any()
                    .add(shipment::Column::Delivered.eq(false))
                    .add(order::Column::Status.is_not_in(TERMINAL_ORDER_STATUSES)),
            )
            .order_by_desc(shipment::Column::OrderId)
            .order_by_desc(shipment::Column::Id)
            .all(db)
            .await?;

        if shipments.is_empty() {
            return Ok(Vec::new());
        }

        let mut order_ids: Vec<i32> = shipments.iter().map(|s| s.order_id).collect();
        order_ids.dedup();
        let orders: HashMap<i32, CandidateOrder> = order::Entity::find()
            .select_only()
            .column(order::Column::Id)
            .column(order::Column::Status)
            .column(order::Column::ShippingTrackingCode)
            .filter(order::Column::Id.is_in(order_ids))
            .into_model::<CandidateOrder>()
            .all(db)
            .await?
            .into_iter()
            .map(|order| (order.id, order))
            .collect();

        let candidates: Vec<SyncCandidate> = shipments
            .into_iter()
            .filter_map(|shipment| {
                let order = orders.get(&shipment.order_id).cloned()?;
                Some(SyncCandidate { shipment, order })
            })
            .collect();

        debug!(count = candidates.len(), "Loaded reconciliation candidates");
        Ok(candidates)
    }

    /// Writes only the fields present in `changes`.
    pub async fn apply_shipment_changes(
        &self,
        current: &shipment::Model,
        changes: &ShipmentChanges,
    ) -> Result<shipment::Model, ServiceError> {
        let mut active: shipment::ActiveModel = current.clone().into();

        if let Some(status) = &changes.status {
            active.status = Set(status.clone());
        }
        if let Some(tracking_code) = &changes.tracking_code {
            active.tracking_code = Set(Some(tracking_code.clone()));
        }
        if let Some(protocol) = &changes.protocol {
            active.protocol = Set(Some(protocol.clone()));
        }
        if let Some(service_name) = &changes.service_name {
            active.service_name = Set(Some(service_name.clone()));
        }
        if let Some(carrier) = &changes.carrier {
            active.carrier = Set(Some(carrier.clone()));
        }
        if let Some(posted_at) = changes.posted_at {
            active.posted = Set(true);
            active.posted_at = Set(Some(posted_at));
        }
        if let Some(delivered_at) = changes.delivered_at {
            active.delivered = Set(true);
            active.delivered_at = Set(Some(delivered_at));
        }
        if let Some(canceled_at) = changes.canceled_at {
            active.canceled = Set(true);
            active.canceled_at = Set(Some(canceled_at));
        }

        Ok(active.update(self.base.get_db()).await?)
    }

    /// Writes only the fields present in `changes`. Leaves the row alone
    /// when there is nothing to write.
    pub async fn apply_order_changes(
        &self,
        order_id: i32,
        changes: &OrderChanges,
    ) -> Result<(), ServiceError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut update = order::Entity::update_many()
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id));
        if let Some(status) = changes.status {
            update = update.col_expr(order::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(code) = &changes.shipping_tracking_code {
            update = update.col_expr(order::Column::ShippingTrackingCode, Expr::value(code.clone()));
        }

        update.exec(self.base.get_db()).await?;
        Ok(())
    }

    pub async fn load_return_order(&self, order_id: i32) -> Result<ReturnOrder, ServiceError> {
        let db = self.base.get_db();
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let address = order.find_related(address::Entity).one(db).await?;
        let items = order
            .find_related(order_item::Entity)
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await?;

        Ok(ReturnOrder {
            order,
            address,
            items,
        })
    }

    /// Inserts the return shipment and moves the order to
    /// `return_label_generated` in one transaction.
    ///
    /// Fails with `PreconditionError` if the order left `return_approved`
    /// while the carrier steps were running.
    pub async fn commit_return_label(
        &self,
        new: NewReturnShipment,
    ) -> Result<shipment::Model, ServiceError> {
        let txn = self.base.get_db().begin().await?;

        let order_update = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::ReturnLabelGenerated.as_str()),
            )
            .col_expr(
                order::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(new.order_id))
            .filter(order::Column::Status.eq(OrderStatus::ReturnApproved))
            .exec(&txn)
            .await?;

        if order_update.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::PreconditionError(format!(
                "Order {} is no longer approved for return",
                new.order_id
            )));
        }

        if let Some(code) = &new.tracking_code {
            order::Entity::update_many()
                .col_expr(
                    order::Column::ShippingTrackingCode,
                    Expr::value(code.clone()),
                )
                .filter(order::Column::Id.eq(new.order_id))
                .exec(&txn)
                .await?;
        }

        let shipment = shipment::ActiveModel {
            order_id: Set(new.order_id),
            carrier_order_id: Set(Some(new.carrier_order_id)),
            status: Set("pending".to_string()),
            tracking_code: Set(new.tracking_code),
            protocol: Set(new.protocol),
            service_id: Set(Some(new.service_id)),
            service_name: Set(Some(new.service_name)),
            carrier: Set(new.carrier),
            posted: Set(false),
            posted_at: Set(None),
            delivered: Set(false),
            delivered_at: Set(None),
            canceled: Set(false),
            canceled_at: Set(None),
            label_url: Set(new.label_url),
            price: Set(new.price),
            discount: Set(new.discount),
            final_price: Set(new.final_price),
            delivery_time: Set(new.delivery_time),
            paid: Set(true),
            error: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(
            order_id = new.order_id,
            shipment_id = shipment.id,
            "Return shipment committed"
        );
        Ok(shipment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::fixtures::*;

    #[tokio::test]
    async fn candidates_exclude_unpurchased_and_finished_shipments() {
        let db = setup_db().await;
        insert_order(&db, 10, OrderStatus::Shipped, None).await;
        insert_order(&db, 11, OrderStatus::Paid, None).await;
        insert_order(&db, 12, OrderStatus::Delivered, None).await;
        insert_order(&db, 13, OrderStatus::Shipped, None).await;

        insert_shipment(&db, 10, Some("ME10"), "posted").await;
        // no carrier id yet
        insert_shipment(&db, 11, None, "pending").await;
        let finished = insert_shipment(&db, 12, Some("ME12"), "delivered").await;
        insert_shipment(&db, 13, Some("ME13"), "released").await;

        let repo = ShipmentRepository::new(Arc::new(db));
        repo.apply_shipment_changes(
            &finished,
            &ShipmentChanges {
                delivered_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let candidates = repo.find_sync_candidates().await.unwrap();
        let ids: Vec<i32> = candidates.iter().map(|c| c.order.id).collect();
        assert_eq!(ids, vec![13, 10]);
    }

    #[tokio::test]
    async fn unknown_order_status_still_loads_as_candidate() {
        use sea_orm::ConnectionTrait;

        let db = setup_db().await;
        insert_order(&db, 14, OrderStatus::Paid, None).await;
        insert_order(&db, 15, OrderStatus::Paid, None).await;
        insert_shipment(&db, 14, Some("ME14"), "released").await;
        insert_shipment(&db, 15, Some("ME15"), "released").await;
        db.execute_unprepared("UPDATE orders SET status = 'return_rejected' WHERE id = 15")
            .await
            .unwrap();

        let repo = ShipmentRepository::new(Arc::new(db));
        let candidates = repo.find_sync_candidates().await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].order.status, "return_rejected");
        assert_eq!(candidates[0].order.known_status(), None);
        assert_eq!(candidates[1].order.known_status(), Some(OrderStatus::Paid));
    }

    #[tokio::test]
    async fn shipment_changes_only_touch_given_fields() {
        let db = setup_db().await;
        insert_order(&db, 20, OrderStatus::Paid, None).await;
        let shipment = insert_shipment(&db, 20, Some("ME20"), "released").await;
        let repo = ShipmentRepository::new(Arc::new(db));

        let posted_at = Utc::now();
        let updated = repo
            .apply_shipment_changes(
                &shipment,
                &ShipmentChanges {
                    status: Some("posted".into()),
                    posted_at: Some(posted_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, "posted");
        assert!(updated.posted);
        assert!(updated.posted_at.is_some());
        assert!(!updated.delivered);
        assert_eq!(updated.service_name.as_deref(), Some("PAC"));
    }

    #[tokio::test]
    async fn return_commit_refuses_orders_no_longer_approved() {
        let db = setup_db().await;
        insert_order(&db, 30, OrderStatus::Refunded, None).await;
        let repo = ShipmentRepository::new(Arc::new(db));

        let result = repo
            .commit_return_label(NewReturnShipment {
                order_id: 30,
                carrier_order_id: "ME30".into(),
                protocol: None,
                service_id: 1,
                service_name: "PAC".into(),
                carrier: None,
                price: 10.0,
                discount: 0.0,
                final_price: 10.0,
                delivery_time: None,
                tracking_code: None,
                label_url: None,
            })
            .await;

        assert!(matches!(result, Err(ServiceError::PreconditionError(_))));
        let candidates = repo.find_sync_candidates().await.unwrap();
        assert!(candidates.is_empty());
    }
}
