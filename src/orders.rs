//! Order placement and cancellation.
//!
//! Placement records the sale: one order document per submission plus an
//! `order_count` bump for every line. Stock is untouched here, it was already
//! reserved when the items entered the cart. Cancellation is the reverse of
//! that reservation: each line's quantity goes back to the catalog and the
//! order document is removed. `order_count` stays where it is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info};

use crate::catalog;
use crate::error::AppError;
use crate::store::{FindOptions, Keyed, Store};
use crate::utils::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub food_id: String,
    pub name: String,
    pub price: f64,
    pub cart_quantity: u64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Persisted with every counter update applied.
    Placed,
    /// Persisted, but at least one counter update is still outstanding.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    pub created_at: u64,
}

impl Keyed for Order {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: String) {
        self.id = key;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderLine {
    pub food_id: String,
    pub name: String,
    pub price: f64,
    pub cart_quantity: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub user_id: String,
    pub lines: Vec<PlaceOrderLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Restock {
    pub food_id: String,
    pub quantity: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancellation {
    pub deleted_count: u64,
    pub restocked: Vec<Restock>,
}

/// Persist one order for the whole submission, then bump every food's
/// `order_count`.
///
/// Line foods are verified up front, so the counter phase cannot half-fail on
/// an unknown id. If a bump still fails (store unavailable), the order is
/// marked `partial` and the outstanding bumps are retried in the background
/// until they land; the failure is never dropped silently.
pub fn place_order(store: &Store, request: PlaceOrder) -> Result<Order, AppError> {
    if request.lines.is_empty() {
        return Err(AppError::Validation(
            "order must contain at least one line".to_string(),
        ));
    }
    if request.lines.iter().any(|l| l.cart_quantity == 0) {
        return Err(AppError::Validation(
            "cartQuantity must be positive".to_string(),
        ));
    }
    for line in &request.lines {
        if store.foods.find_one(|f| f.id == line.food_id)?.is_none() {
            return Err(AppError::NotFound("food"));
        }
    }

    let lines: Vec<OrderLine> = request
        .lines
        .iter()
        .map(|l| OrderLine {
            food_id: l.food_id.clone(),
            name: l.name.clone(),
            price: l.price,
            cart_quantity: l.cart_quantity,
            total: l.cart_quantity as f64 * l.price,
        })
        .collect();

    let mut order = store.orders.insert(Order {
        id: String::new(),
        user_id: request.user_id,
        lines,
        status: OrderStatus::Placed,
        created_at: now_millis(),
    })?;

    let mut outstanding = Vec::new();
    for line in &order.lines {
        if let Err(err) = catalog::adjust_order_count(store, &line.food_id, line.cart_quantity) {
            error!(
                "order {}: orderCount bump failed for food {}: {err}",
                order.id, line.food_id
            );
            outstanding.push((line.food_id.clone(), line.cart_quantity));
        }
    }
    if outstanding.is_empty() {
        return Ok(order);
    }

    let order_id = order.id.clone();
    store
        .orders
        .update_one(|o| o.id == order_id, |o| o.status = OrderStatus::Partial)?;
    order.status = OrderStatus::Partial;
    tokio::spawn(retry_order_counts(store.clone(), order_id, outstanding));
    Ok(order)
}

/// Background recovery for counter bumps that failed at placement.
async fn retry_order_counts(store: Store, order_id: String, mut pending: Vec<(String, u64)>) {
    let mut delay = Duration::from_millis(100);
    for _ in 0..5 {
        sleep(delay).await;
        delay *= 2;
        pending.retain(|(food_id, quantity)| {
            catalog::adjust_order_count(&store, food_id, *quantity).is_err()
        });
        if pending.is_empty() {
            match store
                .orders
                .update_one(|o| o.id == order_id, |o| o.status = OrderStatus::Placed)
            {
                Ok(_) => info!("order {order_id}: outstanding orderCount updates recovered"),
                Err(err) => error!("order {order_id}: counts recovered but status update failed: {err}"),
            }
            return;
        }
    }
    error!(
        "order {order_id}: giving up on {} outstanding orderCount update(s)",
        pending.len()
    );
}

pub fn user_orders(
    store: &Store,
    user_id: &str,
    page: u64,
    page_size: u64,
) -> Result<(Vec<Order>, u64), AppError> {
    let orders = store.orders.find(
        |o| o.user_id == user_id,
        &FindOptions::page(page, page_size),
    )?;
    let total = store.orders.count(|o| o.user_id == user_id)?;
    Ok((orders, total))
}

/// Claims the order (removing it atomically, so a second cancel sees
/// not-found rather than restocking twice), then returns every line's
/// quantity to the catalog.
pub fn cancel_order(store: &Store, order_id: &str) -> Result<OrderCancellation, AppError> {
    let order = store
        .orders
        .take_one(|o| o.id == order_id)?
        .ok_or(AppError::NotFound("order"))?;

    let mut restocked = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        match catalog::adjust_quantity(store, &line.food_id, line.cart_quantity as i64) {
            Ok(food) => restocked.push(Restock {
                food_id: line.food_id.clone(),
                quantity: food.quantity,
            }),
            Err(err) => error!(
                "order {}: restock of {} unit(s) failed for food {}: {err}",
                order.id, line.cart_quantity, line.food_id
            ),
        }
    }

    Ok(OrderCancellation {
        deleted_count: 1,
        restocked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Food;

    fn seed_food(store: &Store, name: &str, price: f64, quantity: u64) -> Food {
        catalog::add_food(
            store,
            Food {
                id: String::new(),
                name: name.to_string(),
                price,
                quantity,
                order_count: 0,
                owner_email: "owner@example.com".to_string(),
                image: None,
            },
        )
        .unwrap()
    }

    fn submission(user: &str, lines: Vec<(&Food, u64)>) -> PlaceOrder {
        PlaceOrder {
            user_id: user.to_string(),
            lines: lines
                .into_iter()
                .map(|(food, quantity)| PlaceOrderLine {
                    food_id: food.id.clone(),
                    name: food.name.clone(),
                    price: food.price,
                    cart_quantity: quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn place_order_persists_one_record_and_bumps_counts() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);
        let soup = seed_food(&store, "Soup", 3.0, 5);

        let order = place_order(&store, submission("u", vec![(&rice, 7), (&soup, 2)])).unwrap();
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].total, 14.0);

        assert_eq!(store.orders.count(|_| true).unwrap(), 1);
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().order_count, 7);
        assert_eq!(catalog::get_food(&store, &soup.id).unwrap().order_count, 2);
        // placement never touches available stock
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().quantity, 10);
        assert_eq!(catalog::get_food(&store, &soup.id).unwrap().quantity, 5);
    }

    #[test]
    fn place_order_validates_lines() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);

        assert!(matches!(
            place_order(&store, submission("u", vec![])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            place_order(&store, submission("u", vec![(&rice, 0)])),
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.orders.count(|_| true).unwrap(), 0);
    }

    #[test]
    fn place_order_with_unknown_food_persists_nothing() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);
        let ghost = Food {
            id: "missing".to_string(),
            name: "Ghost".to_string(),
            price: 1.0,
            quantity: 0,
            order_count: 0,
            owner_email: "owner@example.com".to_string(),
            image: None,
        };

        assert!(matches!(
            place_order(&store, submission("u", vec![(&rice, 1), (&ghost, 1)])),
            Err(AppError::NotFound("food"))
        ));
        assert_eq!(store.orders.count(|_| true).unwrap(), 0);
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().order_count, 0);
    }

    #[test]
    fn user_orders_pages_and_counts() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 100);
        for _ in 0..3 {
            place_order(&store, submission("u", vec![(&rice, 1)])).unwrap();
        }
        place_order(&store, submission("someone-else", vec![(&rice, 1)])).unwrap();

        let (page, total) = user_orders(&store, "u", 0, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        let (rest, _) = user_orders(&store, "u", 1, 2).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn cancel_order_restocks_every_line_and_deletes() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);
        let soup = seed_food(&store, "Soup", 3.0, 5);

        // stock was reserved at cart-add time; model that before ordering
        catalog::adjust_quantity(&store, &rice.id, -7).unwrap();
        catalog::adjust_quantity(&store, &soup.id, -2).unwrap();
        let order = place_order(&store, submission("u", vec![(&rice, 7), (&soup, 2)])).unwrap();

        let cancellation = cancel_order(&store, &order.id).unwrap();
        assert_eq!(cancellation.deleted_count, 1);
        assert_eq!(cancellation.restocked.len(), 2);
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().quantity, 10);
        assert_eq!(catalog::get_food(&store, &soup.id).unwrap().quantity, 5);
        assert_eq!(store.orders.count(|_| true).unwrap(), 0);

        // popularity is monotonic: cancelling does not reverse it
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().order_count, 7);

        assert!(matches!(
            cancel_order(&store, &order.id),
            Err(AppError::NotFound("order"))
        ));
    }

    #[test]
    fn cancel_unknown_order_changes_nothing() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);

        assert!(matches!(
            cancel_order(&store, "missing"),
            Err(AppError::NotFound("order"))
        ));
        assert_eq!(catalog::get_food(&store, &rice.id).unwrap().quantity, 10);
    }

    #[test]
    fn reads_are_idempotent_without_intervening_writes() {
        let store = Store::new();
        let rice = seed_food(&store, "Fried Rice", 2.0, 10);
        place_order(&store, submission("u", vec![(&rice, 1)])).unwrap();

        let first = user_orders(&store, "u", 0, 5).unwrap();
        let second = user_orders(&store, "u", 0, 5).unwrap();
        assert_eq!(first, second);

        let listing_one = catalog::list_foods(&store, 0, 8).unwrap();
        let listing_two = catalog::list_foods(&store, 0, 8).unwrap();
        assert_eq!(listing_one, listing_two);
    }
}
