//! Food catalog.
//!
//! `Food.quantity` is the single source of truth for available stock and can
//! never go negative: every decrement goes through the store's conditional
//! update, so a request for more units than remain is rejected without
//! touching the record. `order_count` is the cumulative number of units ever
//! ordered and only grows (popularity ranking reads it descending).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::{Conditional, FindOptions, Keyed, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u64,
    #[serde(default)]
    pub order_count: u64,
    pub owner_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Keyed for Food {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: String) {
        self.id = key;
    }
}

/// Merge-update payload: only supplied fields overwrite the stored record.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<u64>,
    pub order_count: Option<u64>,
    pub owner_email: Option<String>,
    pub image: Option<String>,
}

pub fn add_food(store: &Store, food: Food) -> Result<Food, AppError> {
    if food.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if food.owner_email.trim().is_empty() {
        return Err(AppError::Validation("ownerEmail is required".to_string()));
    }
    Ok(store.foods.insert(food)?)
}

/// Lookup by exact id first, then by case-insensitive name prefix. URL paths
/// spell spaces as hyphens, so "fried-rice" matches "Fried Rice".
pub fn get_food(store: &Store, key: &str) -> Result<Food, AppError> {
    if let Some(food) = store.foods.find_one(|f| f.id == key)? {
        return Ok(food);
    }
    let name = key.replace('-', " ").to_lowercase();
    store
        .foods
        .find_one(|f| f.name.to_lowercase().starts_with(&name))?
        .ok_or(AppError::NotFound("food"))
}

pub fn list_foods(store: &Store, page: u64, page_size: u64) -> Result<(Vec<Food>, u64), AppError> {
    let foods = store.foods.find(|_| true, &FindOptions::page(page, page_size))?;
    let total = store.foods.count(|_| true)?;
    Ok((foods, total))
}

pub fn added_foods(
    store: &Store,
    owner_email: &str,
    page: u64,
    page_size: u64,
) -> Result<(Vec<Food>, u64), AppError> {
    let foods = store.foods.find(
        |f| f.owner_email == owner_email,
        &FindOptions::page(page, page_size),
    )?;
    let total = store.foods.count(|f| f.owner_email == owner_email)?;
    Ok((foods, total))
}

fn by_order_count_desc(a: &Food, b: &Food) -> Ordering {
    b.order_count.cmp(&a.order_count)
}

pub fn top_selling(store: &Store, limit: u64) -> Result<Vec<Food>, AppError> {
    let options = FindOptions {
        sort: Some(by_order_count_desc),
        skip: 0,
        limit: Some(limit),
    };
    Ok(store.foods.find(|_| true, &options)?)
}

pub fn search_foods(
    store: &Store,
    keyword: &str,
    page: u64,
    page_size: u64,
) -> Result<(Vec<Food>, u64), AppError> {
    let needle = keyword.to_lowercase();
    let foods = store.foods.find(
        |f| f.name.to_lowercase().contains(&needle),
        &FindOptions::page(page, page_size),
    )?;
    let total = store
        .foods
        .count(|f| f.name.to_lowercase().contains(&needle))?;
    Ok((foods, total))
}

pub fn update_food(store: &Store, id: &str, patch: FoodPatch) -> Result<Food, AppError> {
    store
        .foods
        .update_one(
            |f| f.id == id,
            |f| {
                if let Some(name) = patch.name {
                    f.name = name;
                }
                if let Some(price) = patch.price {
                    f.price = price;
                }
                if let Some(quantity) = patch.quantity {
                    f.quantity = quantity;
                }
                if let Some(order_count) = patch.order_count {
                    f.order_count = order_count;
                }
                if let Some(owner_email) = patch.owner_email {
                    f.owner_email = owner_email;
                }
                if let Some(image) = patch.image {
                    f.image = Some(image);
                }
            },
        )?
        .ok_or(AppError::NotFound("food"))
}

/// Atomic `quantity += delta`. A negative delta that would push the stock
/// below zero fails with `InsufficientStock` and leaves the record untouched.
pub fn adjust_quantity(store: &Store, id: &str, delta: i64) -> Result<Food, AppError> {
    let take = delta.unsigned_abs();
    let outcome = store.foods.update_one_if(
        |f| f.id == id,
        |f| delta >= 0 || f.quantity >= take,
        |f| {
            if delta >= 0 {
                f.quantity += delta as u64;
            } else {
                f.quantity -= take;
            }
        },
    )?;
    match outcome {
        Conditional::Applied(food) => Ok(food),
        Conditional::Rejected => Err(AppError::InsufficientStock),
        Conditional::Missing => Err(AppError::NotFound("food")),
    }
}

/// Atomic `order_count += delta`. The counter is monotonic: cancellations do
/// not reverse it.
pub fn adjust_order_count(store: &Store, id: &str, delta: u64) -> Result<Food, AppError> {
    store
        .foods
        .update_one(|f| f.id == id, |f| f.order_count += delta)?
        .ok_or(AppError::NotFound("food"))
}
