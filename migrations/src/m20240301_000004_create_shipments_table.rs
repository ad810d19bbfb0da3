use sea_orm_migration::prelude::*;

use super::m20240301_000002_create_orders_table::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Shipments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Shipments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Shipments::OrderId).integer().not_null())
                    .col(ColumnDef::new(Shipments::CarrierOrderId).string().null())
                    .col(
                        ColumnDef::new(Shipments::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Shipments::TrackingCode).string().null())
                    .col(ColumnDef::new(Shipments::Protocol).string().null())
                    .col(ColumnDef::new(Shipments::ServiceId).integer().null())
                    .col(ColumnDef::new(Shipments::ServiceName).string().null())
                    .col(ColumnDef::new(Shipments::Carrier).string().null())
                    .col(
                        ColumnDef::new(Shipments::Posted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Shipments::PostedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Shipments::Delivered)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Shipments::DeliveredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Shipments::Canceled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Shipments::CanceledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Shipments::LabelUrl).text().null())
                    .col(
                        ColumnDef::new(Shipments::Price)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Shipments::Discount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Shipments::FinalPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Shipments::DeliveryTime).integer().null())
                    .col(
                        ColumnDef::new(Shipments::Paid)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Shipments::Error).text().null())
                    .col(
                        ColumnDef::new(Shipments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Shipments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipments_order_id")
                            .from(Shipments::Table, Shipments::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Shipments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Shipments {
    Table,
    Id,
    OrderId,
    CarrierOrderId,
    Status,
    TrackingCode,
    Protocol,
    ServiceId,
    ServiceName,
    Carrier,
    Posted,
    PostedAt,
    Delivered,
    DeliveredAt,
    Canceled,
    CanceledAt,
    LabelUrl,
    Price,
    Discount,
    FinalPrice,
    DeliveryTime,
    Paid,
    Error,
    CreatedAt,
    UpdatedAt,
}
