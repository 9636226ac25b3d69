//! Cart ledger.
//!
//! One cart document per user holding an ordered list of line items. Stock is
//! reserved the moment an item enters a cart: `add_to_cart` decrements the
//! food's quantity through the store's conditional update before the line is
//! written, and the reservation is released only by removing the line or
//! cancelling the order. Re-adding a food merges into the existing line, so a
//! (user, food) pair never has more than one line.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::catalog::{self, Food};
use crate::error::AppError;
use crate::store::{FindOptions, Keyed, Store};
use crate::utils::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub food_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub price: f64,
    pub cart_quantity: u64,
    pub total: f64,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub lines: Vec<CartLine>,
}

impl Keyed for Cart {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: String) {
        self.id = key;
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub user_id: String,
    pub food_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    pub cart_quantity: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRemoval {
    pub deleted_count: u64,
    pub food: Food,
}

/// Reserve stock, then add or merge the user's line for this food.
///
/// The reservation is the conditional decrement: it either applies in full or
/// rejects with `InsufficientStock`, so two concurrent adds racing for the
/// last units cannot both succeed. Should the line write fail afterwards, the
/// reservation is released again.
pub fn add_to_cart(store: &Store, request: AddToCart) -> Result<CartLine, AppError> {
    if request.cart_quantity == 0 {
        return Err(AppError::Validation(
            "cartQuantity must be positive".to_string(),
        ));
    }

    catalog::adjust_quantity(store, &request.food_id, -(request.cart_quantity as i64))?;

    let line = CartLine {
        food_id: request.food_id.clone(),
        name: request.name.clone(),
        image: request.image.clone(),
        price: request.price,
        cart_quantity: request.cart_quantity,
        total: request.cart_quantity as f64 * request.price,
        created_at: now_millis(),
    };

    let upserted = store.carts.upsert(
        |c| c.user_id == request.user_id,
        |c| match c.lines.iter_mut().find(|l| l.food_id == request.food_id) {
            Some(existing) => {
                existing.cart_quantity += request.cart_quantity;
                existing.total = existing.cart_quantity as f64 * request.price;
            }
            None => c.lines.push(line.clone()),
        },
        || Cart {
            id: String::new(),
            user_id: request.user_id.clone(),
            lines: vec![line.clone()],
        },
    );

    let cart = match upserted {
        Ok(cart) => cart,
        Err(err) => {
            if let Err(release) =
                catalog::adjust_quantity(store, &request.food_id, request.cart_quantity as i64)
            {
                error!(
                    "failed to release reservation of {} unit(s) for food {}: {release}",
                    request.cart_quantity, request.food_id
                );
            }
            return Err(err.into());
        }
    };

    cart.lines
        .into_iter()
        .find(|l| l.food_id == request.food_id)
        .ok_or(AppError::Internal)
}

/// A user with no cart simply has no lines; this never fails with not-found.
pub fn get_cart(store: &Store, user_id: &str) -> Result<Vec<CartLine>, AppError> {
    let lines = store
        .carts
        .project(
            |c| c.user_id == user_id,
            &FindOptions::default(),
            |c| c.lines.clone(),
        )?
        .into_iter()
        .flatten()
        .collect();
    Ok(lines)
}

/// Drops every line for the user without restocking: used after checkout,
/// where the reservation now belongs to the placed order.
pub fn clear_cart(store: &Store, user_id: &str) -> Result<u64, AppError> {
    let removed = store.carts.take_one(|c| c.user_id == user_id)?;
    Ok(removed.map(|c| c.lines.len() as u64).unwrap_or(0))
}

/// Removes one line and releases its reservation back to the catalog.
pub fn remove_cart_item(
    store: &Store,
    user_id: &str,
    food_id: &str,
    restock_quantity: u64,
) -> Result<CartItemRemoval, AppError> {
    let mut removed = 0u64;
    let updated = store.carts.update_one(
        |c| c.user_id == user_id,
        |c| {
            let before = c.lines.len();
            c.lines.retain(|l| l.food_id != food_id);
            removed = (before - c.lines.len()) as u64;
        },
    )?;
    if updated.is_none() || removed == 0 {
        return Err(AppError::NotFound("cart item"));
    }
    store
        .carts
        .delete_many(|c| c.user_id == user_id && c.lines.is_empty())?;

    let food = catalog::adjust_quantity(store, food_id, restock_quantity as i64)?;
    Ok(CartItemRemoval {
        deleted_count: removed,
        food,
    })
}
