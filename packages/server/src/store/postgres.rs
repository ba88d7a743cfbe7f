use std::collections::HashMap;

use async_trait::async_trait;
use common::{Delivery, Item, Order, Payment};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tracing::debug;

use super::{OrderStore, StoreError};
use crate::entity::{delivery, item, order, payment};

/// [`OrderStore`] backed by Postgres through sea-orm.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: DatabaseConnection,
}

impl SeaOrmOrderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StoreError> {
        let header = order::Entity::find()
            .filter(order::Column::OrderUid.eq(order_uid))
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let delivery = delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(header.id))
            .one(&self.db)
            .await?
            .ok_or_else(|| missing_part(&header, "delivery"))?;

        let payment = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(header.id))
            .one(&self.db)
            .await?
            .ok_or_else(|| missing_part(&header, "payment"))?;

        let items = item::Entity::find()
            .filter(item::Column::OrderId.eq(header.id))
            .order_by_asc(item::Column::Id)
            .all(&self.db)
            .await?;

        Ok(assemble(header, delivery, payment, items))
    }

    async fn list_page(&self, limit: u64, offset: u64) -> Result<(Vec<Order>, u64), StoreError> {
        let total = order::Entity::find().count(&self.db).await?;

        let headers = order::Entity::find()
            .order_by_desc(order::Column::DateCreated)
            .order_by_desc(order::Column::Id)
            .offset(Some(offset))
            .limit(Some(limit))
            .all(&self.db)
            .await?;

        if headers.is_empty() {
            return Ok((Vec::new(), total));
        }

        let ids: Vec<i32> = headers.iter().map(|h| h.id).collect();

        let mut deliveries: HashMap<i32, delivery::Model> = delivery::Entity::find()
            .filter(delivery::Column::OrderId.is_in(ids.clone()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|d| (d.order_id, d))
            .collect();

        let mut payments: HashMap<i32, payment::Model> = payment::Entity::find()
            .filter(payment::Column::OrderId.is_in(ids.clone()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|p| (p.order_id, p))
            .collect();

        let mut items: HashMap<i32, Vec<item::Model>> = HashMap::new();
        for row in item::Entity::find()
            .filter(item::Column::OrderId.is_in(ids))
            .order_by_asc(item::Column::Id)
            .all(&self.db)
            .await?
        {
            items.entry(row.order_id).or_default().push(row);
        }

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let delivery = deliveries
                .remove(&header.id)
                .ok_or_else(|| missing_part(&header, "delivery"))?;
            let payment = payments
                .remove(&header.id)
                .ok_or_else(|| missing_part(&header, "payment"))?;
            let rows = items.remove(&header.id).unwrap_or_default();
            orders.push(assemble(header, delivery, payment, rows));
        }

        Ok((orders, total))
    }

    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let existing = order::Entity::find()
            .filter(order::Column::OrderUid.eq(&order.order_uid))
            .count(&txn)
            .await?;
        if existing > 0 {
            return Err(StoreError::AlreadyExists(order.order_uid.clone()));
        }

        let header = insert_header(&txn, order)
            .await
            .map_err(|e| classify_insert_error(e, &order.order_uid))?;

        delivery::ActiveModel {
            order_id: Set(header.id),
            name: Set(order.delivery.name.clone()),
            phone: Set(order.delivery.phone.clone()),
            zip: Set(order.delivery.zip.clone()),
            city: Set(order.delivery.city.clone()),
            address: Set(order.delivery.address.clone()),
            region: Set(order.delivery.region.clone()),
            email: Set(order.delivery.email.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let p = &order.payment;
        payment::ActiveModel {
            order_id: Set(header.id),
            transaction: Set(p.transaction.clone()),
            request_id: Set(p.request_id.clone()),
            currency: Set(p.currency.clone()),
            provider: Set(p.provider.clone()),
            amount: Set(p.amount),
            payment_dt: Set(p.payment_dt),
            bank: Set(p.bank.clone()),
            delivery_cost: Set(p.delivery_cost),
            goods_total: Set(p.goods_total),
            custom_fee: Set(p.custom_fee),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for it in &order.items {
            item::ActiveModel {
                order_id: Set(header.id),
                chrt_id: Set(it.chrt_id),
                track_number: Set(it.track_number.clone()),
                price: Set(it.price),
                rid: Set(it.rid.clone()),
                name: Set(it.name.clone()),
                sale: Set(it.sale),
                size: Set(it.size.clone()),
                total_price: Set(it.total_price),
                nm_id: Set(it.nm_id),
                brand: Set(it.brand.clone()),
                status: Set(it.status),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        // A concurrent writer may win the race between the check and the insert;
        // the unique index then fails the commit instead of the insert.
        txn.commit()
            .await
            .map_err(|e| classify_insert_error(e, &order.order_uid))?;

        debug!(order_uid = %order.order_uid, items = order.items.len(), "Order saved");
        Ok(())
    }
}

async fn insert_header<C: ConnectionTrait>(conn: &C, o: &Order) -> Result<order::Model, DbErr> {
    order::ActiveModel {
        order_uid: Set(o.order_uid.clone()),
        track_number: Set(o.track_number.clone()),
        entry: Set(o.entry.clone()),
        locale: Set(o.locale.clone()),
        internal_signature: Set(o.internal_signature.clone()),
        customer_id: Set(o.customer_id.clone()),
        delivery_service: Set(o.delivery_service.clone()),
        shardkey: Set(o.shardkey.clone()),
        sm_id: Set(o.sm_id),
        date_created: Set(o.date_created),
        oof_shard: Set(o.oof_shard.clone()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

fn classify_insert_error(e: DbErr, order_uid: &str) -> StoreError {
    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        StoreError::AlreadyExists(order_uid.to_string())
    } else {
        StoreError::Database(e)
    }
}

fn missing_part(header: &order::Model, part: &str) -> StoreError {
    StoreError::Database(DbErr::RecordNotFound(format!(
        "{part} row for order {} is missing",
        header.order_uid
    )))
}

fn assemble(
    header: order::Model,
    d: delivery::Model,
    p: payment::Model,
    items: Vec<item::Model>,
) -> Order {
    Order {
        order_uid: header.order_uid,
        track_number: header.track_number,
        entry: header.entry,
        delivery: Delivery {
            name: d.name,
            phone: d.phone,
            zip: d.zip,
            city: d.city,
            address: d.address,
            region: d.region,
            email: d.email,
        },
        payment: Payment {
            transaction: p.transaction,
            request_id: p.request_id,
            currency: p.currency,
            provider: p.provider,
            amount: p.amount,
            payment_dt: p.payment_dt,
            bank: p.bank,
            delivery_cost: p.delivery_cost,
            goods_total: p.goods_total,
            custom_fee: p.custom_fee,
        },
        items: items
            .into_iter()
            .map(|i| Item {
                chrt_id: i.chrt_id,
                track_number: i.track_number,
                price: i.price,
                rid: i.rid,
                name: i.name,
                sale: i.sale,
                size: i.size,
                total_price: i.total_price,
                nm_id: i.nm_id,
                brand: i.brand,
                status: i.status,
            })
            .collect(),
        locale: header.locale,
        internal_signature: header.internal_signature,
        customer_id: header.customer_id,
        delivery_service: header.delivery_service,
        shardkey: header.shardkey,
        sm_id: header.sm_id,
        date_created: header.date_created,
        oof_shard: header.oof_shard,
    }
}
