use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::engine::locks::acquire;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::principal::Role;

/// Exclusive handle on one order. Dropping it publishes the order's current
/// state to the committed view read by listings.
pub struct OrderGuard {
    order: OwnedMutexGuard<Order>,
    committed: Arc<DashMap<Uuid, Order>>,
}

impl Deref for OrderGuard {
    type Target = Order;

    fn deref(&self) -> &Order {
        &self.order
    }
}

impl DerefMut for OrderGuard {
    fn deref_mut(&mut self) -> &mut Order {
        &mut self.order
    }
}

impl Drop for OrderGuard {
    fn drop(&mut self) {
        self.committed.insert(self.order.id, self.order.clone());
    }
}

/// Transition table for the order lifecycle, independent of storage.
pub fn can_transition(from: OrderStatus, to: OrderStatus, actor: Role) -> bool {
    use OrderStatus::*;

    if from.is_terminal() {
        return false;
    }

    matches!(
        (from, to, actor),
        (Pending, Accepted, Role::Driver)
            | (Accepted, InProgress, Role::Driver)
            | (Accepted | InProgress, Completed, Role::Driver)
            | (Pending | Accepted, Cancelled, Role::Customer)
    )
}

impl Order {
    fn ensure_transition(&self, to: OrderStatus, actor: Role) -> Result<(), AppError> {
        if can_transition(self.status, to, actor) {
            return Ok(());
        }

        Err(AppError::Conflict(format!(
            "order {} cannot move from {} to {}",
            self.id, self.status, to
        )))
    }

    pub fn accept(&mut self, driver_id: Uuid) -> Result<(), AppError> {
        if self.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "order {} is no longer available (status {})",
                self.id, self.status
            )));
        }
        self.ensure_transition(OrderStatus::Accepted, Role::Driver)?;

        self.driver_id = Some(driver_id);
        self.status = OrderStatus::Accepted;
        Ok(())
    }

    pub fn cancel(&mut self, requester_id: Uuid) -> Result<(), AppError> {
        if self.customer_id != requester_id {
            return Err(AppError::Unauthorized(format!(
                "order {} belongs to another customer",
                self.id
            )));
        }
        self.ensure_transition(OrderStatus::Cancelled, Role::Customer)?;

        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Checks that `driver_id` may complete this order and returns the price to settle.
    /// Does not mutate; pair with [`Order::mark_completed`] once the credit went through.
    pub fn settlement_price(
        &self,
        driver_id: Uuid,
        actual_price: Option<f64>,
    ) -> Result<f64, AppError> {
        if self.driver_id != Some(driver_id) {
            return Err(AppError::Unauthorized(format!(
                "driver {driver_id} is not assigned to order {}",
                self.id
            )));
        }
        self.ensure_transition(OrderStatus::Completed, Role::Driver)?;

        Ok(actual_price
            .or(self.actual_price)
            .unwrap_or(self.estimated_price))
    }

    pub fn mark_completed(&mut self, settled_price: f64, at: DateTime<Utc>) {
        self.status = OrderStatus::Completed;
        self.actual_price = Some(settled_price);
        self.completed_at = Some(at);
    }

    pub fn lifecycle_invariants_hold(&self) -> bool {
        let driver_ok = self.driver_id.is_none() == (self.status == OrderStatus::Pending);
        let completed_ok = self.completed_at.is_some() == (self.status == OrderStatus::Completed);
        let actual_ok = self.actual_price.is_none() || self.status == OrderStatus::Completed;
        let amounts_ok = self.distance_km >= 0.0
            && self.estimated_price >= 0.0
            && self.actual_price.is_none_or(|price| price >= 0.0);

        driver_ok && completed_ok && actual_ok && amounts_ok
    }
}

/// Every order sits behind its own mutex; status read-modify-write happens under it.
/// Reads go to `committed`, which only ever holds states whose guard was released.
pub struct OrderStore {
    orders: DashMap<Uuid, Arc<Mutex<Order>>>,
    committed: Arc<DashMap<Uuid, Order>>,
    lock_timeout: Duration,
}

impl OrderStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            orders: DashMap::new(),
            committed: Arc::new(DashMap::new()),
            lock_timeout,
        }
    }

    pub fn restore(lock_timeout: Duration, orders: Vec<Order>) -> Self {
        let store = Self::new(lock_timeout);
        for order in orders {
            store.insert(order);
        }
        store
    }

    pub fn insert(&self, order: Order) {
        self.committed.insert(order.id, order.clone());
        self.orders.insert(order.id, Arc::new(Mutex::new(order)));
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub async fn lock(&self, id: Uuid) -> Result<OrderGuard, AppError> {
        let slot = self
            .orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let order = acquire(slot, self.lock_timeout, "order", id).await?;
        Ok(OrderGuard {
            order,
            committed: self.committed.clone(),
        })
    }

    /// Last committed state; never waits on a writer.
    pub fn get(&self, id: Uuid) -> Result<Order, AppError> {
        self.committed
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub async fn accept(&self, id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
        let mut order = self.lock(id).await?;
        order.accept(driver_id)?;
        Ok(order.clone())
    }

    pub async fn cancel(&self, id: Uuid, requester_id: Uuid) -> Result<Order, AppError> {
        let mut order = self.lock(id).await?;
        order.cancel(requester_id)?;
        Ok(order.clone())
    }

    /// Committed copies of every order matching `keep`, newest first.
    pub fn select<F>(&self, keep: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut selected: Vec<Order> = self
            .committed
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}
