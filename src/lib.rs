//! Backend for a food-ordering platform.
//!
//! Clients create and browse food listings, keep a per-user shopping cart,
//! and place orders. The consistency rules live in three modules:
//!
//! - [`catalog`]: food records; `quantity` (available stock, never negative)
//!   and `order_count` (cumulative units ordered, drives popularity).
//! - [`cart`]: stock is reserved the moment an item enters a cart, and a
//!   (user, food) pair never holds more than one line.
//! - [`orders`]: placing an order records the sale and bumps popularity
//!   without touching stock; cancelling returns the reserved units.
//!
//! All state lives in the in-memory document [`store`], whose per-document
//! conditional update is the primitive everything above leans on.
//!
//! # Setup
//!
//! ```sh
//! RUST_LOG=info cargo run
//! ```
//!
//! Page sizes and the port come from the environment, see [`config`].
use std::time::Duration;

use axum::{
    http::{
        header::{CONTENT_SECURITY_POLICY, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{delete, get, post, put},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod orders;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use routes::{
    add_food_handler, add_to_cart_handler, all_foods_handler, added_foods_handler,
    cancel_order_handler, clear_cart_handler, get_cart_handler, get_food_handler,
    place_order_handler, remove_cart_item_handler, root_handler, search_handler,
    top_selling_handler, update_food_handler, user_orders_handler,
};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let security_headers = SetResponseHeaderLayer::overriding(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; img-src 'self' data:"),
    );

    Router::new()
        .route("/", get(root_handler))
        .route("/add-food", post(add_food_handler))
        .route("/foods/{key}", get(get_food_handler))
        .route("/all-foods", get(all_foods_handler))
        .route("/top-selling-foods", get(top_selling_handler))
        .route("/added-foods", get(added_foods_handler))
        .route("/search", get(search_handler))
        .route("/food/update", put(update_food_handler))
        .route("/cart/add", put(add_to_cart_handler))
        .route("/cart/get", get(get_cart_handler))
        .route("/cart/user/delete", delete(clear_cart_handler))
        .route("/cart/user/food/delete", delete(remove_cart_item_handler))
        .route("/orders/add-new", post(place_order_handler))
        .route("/orders/get", get(user_orders_handler))
        .route("/orders/delete", delete(cancel_order_handler))
        .layer(cors)
        .layer(security_headers)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
