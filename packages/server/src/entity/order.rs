use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order header. `order_uid` is the idempotency key.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    #[sea_orm(indexed)]
    pub date_created: DateTimeUtc,
    pub oof_shard: String,

    #[sea_orm(has_one)]
    pub delivery: HasOne<super::delivery::Entity>,

    #[sea_orm(has_one)]
    pub payment: HasOne<super::payment::Entity>,

    #[sea_orm(has_many)]
    pub items: HasMany<super::item::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
