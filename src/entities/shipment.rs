use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Carrier-backed shipment for an order.
///
/// `status` mirrors the carrier vocabulary verbatim. The `posted`, `delivered`
/// and `canceled` flags are milestones: once set they stay set, and their
/// companion timestamps are written exactly once.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id: i32,
    /// Carrier-side order id, populated once shipping is purchased
    pub carrier_order_id: Option<String>,
    pub status: String,
    pub tracking_code: Option<String>,
    pub protocol: Option<String>,
    pub service_id: Option<i32>,
    pub service_name: Option<String>,
    pub carrier: Option<String>,
    pub posted: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub label_url: Option<String>,
    pub price: f64,
    pub discount: f64,
    pub final_price: f64,
    /// Maximum delivery range quoted by the carrier, in days
    pub delivery_time: Option<i32>,
    pub paid: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && active_model.created_at.is_not_set() {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
