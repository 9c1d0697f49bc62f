use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_inventory_records_table::Migration),
            Box::new(m20240101_000002_create_import_batches_table::Migration),
            Box::new(m20240101_000003_create_import_batch_items_table::Migration),
            Box::new(m20240101_000004_create_orders_table::Migration),
            Box::new(m20240101_000005_create_order_items_table::Migration),
            Box::new(m20240101_000006_create_audit_log_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_inventory_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_inventory_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryRecords::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::VariantId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryRecords::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryRecords {
        Table,
        Id,
        VariantId,
        Quantity,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_import_batches_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_import_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ImportBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ImportBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportBatches::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(ImportBatches::UserId).uuid().not_null())
                        .col(ColumnDef::new(ImportBatches::Reference).string().null())
                        .col(
                            ColumnDef::new(ImportBatches::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ImportBatches::ImportStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ImportBatches::PaymentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportBatches::CompletedAt).timestamp().null())
                        .col(
                            ColumnDef::new(ImportBatches::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportBatches::UpdatedAt).timestamp().null())
                        .col(
                            ColumnDef::new(ImportBatches::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_import_batches_supplier_id")
                        .table(ImportBatches::Table)
                        .col(ImportBatches::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_import_batches_import_status")
                        .table(ImportBatches::Table)
                        .col(ImportBatches::ImportStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ImportBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ImportBatches {
        Table,
        Id,
        SupplierId,
        UserId,
        Reference,
        TotalAmount,
        ImportStatus,
        PaymentStatus,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000003_create_import_batch_items_table {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000002_create_import_batches_table::ImportBatches;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_import_batch_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ImportBatchItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ImportBatchItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportBatchItems::ImportId).uuid().not_null())
                        .col(
                            ColumnDef::new(ImportBatchItems::VariantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ImportBatchItems::InventoryId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ImportBatchItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ImportBatchItems::NetPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ImportBatchItems::WarrantyPeriodDays)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ImportBatchItems::WarrantyExpiry)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(ImportBatchItems::Notes).string().null())
                        .col(
                            ColumnDef::new(ImportBatchItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_import_batch_items_import_id")
                                .from(ImportBatchItems::Table, ImportBatchItems::ImportId)
                                .to(ImportBatches::Table, ImportBatches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_import_batch_items_import_id")
                        .table(ImportBatchItems::Table)
                        .col(ImportBatchItems::ImportId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_import_batch_items_variant_id")
                        .table(ImportBatchItems::Table)
                        .col(ImportBatchItems::VariantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ImportBatchItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ImportBatchItems {
        Table,
        Id,
        ImportId,
        VariantId,
        InventoryId,
        Quantity,
        NetPrice,
        WarrantyPeriodDays,
        WarrantyExpiry,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000004_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        UserId,
        Status,
        Total,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000005_create_order_items_table {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000004_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::RetailPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderItems::NetPrice).decimal().null())
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_variant_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::VariantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        VariantId,
        Quantity,
        RetailPrice,
        NetPrice,
        CreatedAt,
    }
}

mod m20240101_000006_create_audit_log_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_audit_log_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLog::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLog::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLog::UserId).uuid().null())
                        .col(ColumnDef::new(AuditLog::Action).string().not_null())
                        .col(ColumnDef::new(AuditLog::EntityType).string().not_null())
                        .col(ColumnDef::new(AuditLog::EntityId).string().not_null())
                        .col(ColumnDef::new(AuditLog::Detail).string().null())
                        .col(ColumnDef::new(AuditLog::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_log_created_at")
                        .table(AuditLog::Table)
                        .col(AuditLog::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLog::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum AuditLog {
        Table,
        Id,
        UserId,
        Action,
        EntityType,
        EntityId,
        Detail,
        CreatedAt,
    }
}
