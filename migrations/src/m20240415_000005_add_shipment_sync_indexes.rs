use sea_orm_migration::prelude::*;

use super::m20240301_000002_create_orders_table::Orders;
use super::m20240301_000004_create_shipments_table::Shipments;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reconciliation sweep filters on the carrier id and joins back to orders
        manager
            .create_index(
                Index::create()
                    .name("idx_shipments_carrier_order_id")
                    .table(Shipments::Table)
                    .col(Shipments::CarrierOrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_shipments_order_id")
                    .table(Shipments::Table)
                    .col(Shipments::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_orders_status").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_shipments_order_id").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_shipments_carrier_order_id")
                    .to_owned(),
            )
            .await
    }
}
