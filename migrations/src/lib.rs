pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_addresses_table;
mod m20240301_000002_create_orders_table;
mod m20240301_000003_create_order_items_table;
mod m20240301_000004_create_shipments_table;
mod m20240415_000005_add_shipment_sync_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_addresses_table::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_order_items_table::Migration),
            Box::new(m20240301_000004_create_shipments_table::Migration),
            Box::new(m20240415_000005_add_shipment_sync_indexes::Migration),
        ]
    }
}
