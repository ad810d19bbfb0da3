use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod shipment_repository;

pub use shipment_repository::{
    CandidateOrder, NewReturnShipment, OrderChanges, ReturnOrder, ShipmentChanges,
    ShipmentRepository, SyncCandidate,
};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::entities::{address, order, order_item, shipment, OrderStatus};
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
    use sea_orm_migration::MigratorTrait;

    /// Fresh in-memory SQLite database with the real schema.
    pub async fn setup_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        migrations::Migrator::up(&db, None).await.unwrap();
        db
    }

    pub async fn insert_address(db: &DatabaseConnection) -> address::Model {
        address::ActiveModel {
            recipient_name: Set("Maria Souza".into()),
            phone: Set(Some("21988887777".into())),
            document: Set(Some("12345678909".into())),
            street: Set("Rua das Laranjeiras".into()),
            number: Set("42".into()),
            complement: Set(Some("Apto 301".into())),
            neighborhood: Set("Laranjeiras".into()),
            city: Set("Rio de Janeiro".into()),
            state: Set("RJ".into()),
            postal_code: Set("22240-003".into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn insert_order(
        db: &DatabaseConnection,
        id: i32,
        status: OrderStatus,
        address_id: Option<i32>,
    ) -> order::Model {
        order::ActiveModel {
            id: Set(id),
            status: Set(status),
            shipping_tracking_code: Set(None),
            customer_email: Set(Some("maria@example.com".into())),
            address_id: Set(address_id),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn insert_item(
        db: &DatabaseConnection,
        order_id: i32,
        name: &str,
        unit_price: f64,
        quantity: i32,
    ) -> order_item::Model {
        order_item::ActiveModel {
            order_id: Set(order_id),
            product_id: Set(1),
            product_name: Set(name.into()),
            unit_price: Set(unit_price),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn insert_shipment(
        db: &DatabaseConnection,
        order_id: i32,
        carrier_order_id: Option<&str>,
        status: &str,
    ) -> shipment::Model {
        shipment::ActiveModel {
            order_id: Set(order_id),
            carrier_order_id: Set(carrier_order_id.map(str::to_string)),
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
            price: Set(20.0),
            discount: Set(0.0),
            final_price: Set(20.0),
            delivery_time: Set(Some(7)),
            paid: Set(true),
            error: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }
}
