use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cart::{self, AddToCart, CartItemRemoval, CartLine};
use crate::catalog::{self, Food, FoodPatch};
use crate::error::AppError;
use crate::orders::{self, Order, OrderCancellation, PlaceOrder};
use crate::state::AppState;
use crate::utils::{parse_payload, with_read_retry};

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
}

#[derive(Deserialize)]
pub struct TopSellingQuery {
    quantity: Option<u64>,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    email: Option<String>,
    page: Option<u64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    keyword: Option<String>,
    page: Option<u64>,
}

#[derive(Deserialize)]
pub struct IdQuery {
    id: Option<String>,
}

#[derive(Deserialize)]
pub struct CartItemQuery {
    userid: Option<String>,
    foodid: Option<String>,
    qty: Option<u64>,
}

#[derive(Deserialize)]
pub struct UserOrdersQuery {
    id: Option<String>,
    page: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodsPage {
    foods: Vec<Food>,
    foods_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedFoodsPage {
    result: Vec<Food>,
    foods_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersPage {
    result: Vec<Order>,
    count_orders: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedCart {
    deleted_count: u64,
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

pub async fn root_handler() -> &'static str {
    "Server is running....."
}

pub async fn add_food_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Food>, AppError> {
    let food = parse_payload::<Food>(payload)?;
    Ok(Json(catalog::add_food(&state.store, food)?))
}

pub async fn get_food_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Food>, AppError> {
    let food = with_read_retry(|| catalog::get_food(&state.store, &key)).await?;
    Ok(Json(food))
}

pub async fn all_foods_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FoodsPage>, AppError> {
    let page = query.page.unwrap_or(0);
    let page_size = state.config.all_foods_page_size;
    let (foods, foods_count) =
        with_read_retry(|| catalog::list_foods(&state.store, page, page_size)).await?;
    Ok(Json(FoodsPage { foods, foods_count }))
}

pub async fn top_selling_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopSellingQuery>,
) -> Result<Json<Vec<Food>>, AppError> {
    let limit = query.quantity.unwrap_or(state.config.top_selling_limit);
    let foods = with_read_retry(|| catalog::top_selling(&state.store, limit)).await?;
    Ok(Json(foods))
}

pub async fn added_foods_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<OwnedFoodsPage>, AppError> {
    let email = required(query.email, "email")?;
    let page = query.page.unwrap_or(0);
    let page_size = state.config.added_foods_page_size;
    let (result, foods_count) =
        with_read_retry(|| catalog::added_foods(&state.store, &email, page, page_size)).await?;
    Ok(Json(OwnedFoodsPage {
        result,
        foods_count,
    }))
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<FoodsPage>, AppError> {
    let keyword = required(query.keyword, "keyword")?;
    let page = query.page.unwrap_or(0);
    let page_size = state.config.search_page_size;
    let (foods, foods_count) =
        with_read_retry(|| catalog::search_foods(&state.store, &keyword, page, page_size)).await?;
    Ok(Json(FoodsPage { foods, foods_count }))
}

pub async fn update_food_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
    Json(payload): Json<Value>,
) -> Result<Json<Food>, AppError> {
    let id = required(query.id, "id")?;
    let patch = parse_payload::<FoodPatch>(payload)?;
    Ok(Json(catalog::update_food(&state.store, &id, patch)?))
}

pub async fn add_to_cart_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<CartLine>, AppError> {
    let request = parse_payload::<AddToCart>(payload)?;
    Ok(Json(cart::add_to_cart(&state.store, request)?))
}

pub async fn get_cart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Vec<CartLine>>, AppError> {
    let id = required(query.id, "id")?;
    let lines = with_read_retry(|| cart::get_cart(&state.store, &id)).await?;
    Ok(Json(lines))
}

pub async fn clear_cart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<ClearedCart>, AppError> {
    let id = required(query.id, "id")?;
    let deleted_count = cart::clear_cart(&state.store, &id)?;
    Ok(Json(ClearedCart { deleted_count }))
}

pub async fn remove_cart_item_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CartItemQuery>,
) -> Result<Json<CartItemRemoval>, AppError> {
    let user_id = required(query.userid, "userid")?;
    let food_id = required(query.foodid, "foodid")?;
    let quantity = required(query.qty, "qty")?;
    Ok(Json(cart::remove_cart_item(
        &state.store,
        &user_id,
        &food_id,
        quantity,
    )?))
}

pub async fn place_order_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Order>, AppError> {
    let request = parse_payload::<PlaceOrder>(payload)?;
    Ok(Json(orders::place_order(&state.store, request)?))
}

pub async fn user_orders_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserOrdersQuery>,
) -> Result<Json<OrdersPage>, AppError> {
    let id = required(query.id, "id")?;
    let page = query.page.unwrap_or(0);
    let page_size = state.config.orders_page_size;
    let (result, count_orders) =
        with_read_retry(|| orders::user_orders(&state.store, &id, page, page_size)).await?;
    Ok(Json(OrdersPage {
        result,
        count_orders,
    }))
}

pub async fn cancel_order_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<OrderCancellation>, AppError> {
    let id = required(query.id, "id")?;
    Ok(Json(orders::cancel_order(&state.store, &id)?))
}
