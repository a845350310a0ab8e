//! HTTP server for the order API.
//!
//! Routes requests to the order engine. Every request runs under a child of
//! the shutdown token and is bounded by the configured request timeout.

use crate::apis::order::{self, InputError};
use axum::{
	extract::{rejection::JsonRejection, Path, Query, State},
	http::StatusCode,
	response::Json,
	routing::get,
	Router,
};
use order_core::OrderEngine;
use order_types::{
	APIError, CreateOrderRequest, ListOrdersQuery, ListOrdersResponse, Order,
	UpdateOrderStatusRequest,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the order engine for processing requests.
	pub engine: Arc<OrderEngine>,
	/// Cancelled when the server shuts down.
	pub shutdown: CancellationToken,
	/// Upper bound for handling a single request.
	pub request_timeout: Duration,
}

impl AppState {
	pub fn new(engine: Arc<OrderEngine>, shutdown: CancellationToken) -> Self {
		let request_timeout = engine.config().api.request_timeout();
		Self {
			engine,
			shutdown,
			request_timeout,
		}
	}

	/// Runs a request body with its own cancellation token.
	///
	/// The token is cancelled on server shutdown and once the request
	/// timeout elapses.
	async fn scoped<T, F, Fut>(&self, f: F) -> Result<T, APIError>
	where
		F: FnOnce(CancellationToken) -> Fut,
		Fut: Future<Output = Result<T, APIError>>,
	{
		let cancel = self.shutdown.child_token();
		let _guard = cancel.clone().drop_guard();
		match tokio::time::timeout(self.request_timeout, f(cancel)).await {
			Ok(result) => result,
			Err(_) => {
				tracing::warn!(
					timeout_secs = self.request_timeout.as_secs(),
					"Request timed out"
				);
				Err(APIError::ServiceUnavailable {
					error_type: "REQUEST_TIMEOUT".to_string(),
					message: format!(
						"request did not complete within {}s",
						self.request_timeout.as_secs()
					),
					retry_after: Some(1),
				})
			},
		}
	}
}

/// Builds the router with all order routes and middleware.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(handle_health))
		.route("/orders", get(handle_list_orders).post(handle_create_order))
		.route(
			"/orders/{id}",
			get(handle_get_order)
				.put(handle_update_order_status)
				.delete(handle_delete_order),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(state)
}

/// Starts the HTTP server and serves until `shutdown` is cancelled.
pub async fn start_server(
	engine: Arc<OrderEngine>,
	shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let api_config = engine.config().api.clone();
	let app = router(AppState::new(engine, shutdown.clone()));

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	tracing::info!("Order API server stopped");
	Ok(())
}

/// Handles GET / requests.
async fn handle_health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

/// Handles POST /orders requests.
async fn handle_create_order(
	State(state): State<AppState>,
	body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let Json(request) = body.map_err(|e| InputError::InvalidBody(e.body_text()))?;
	let engine = state.engine.clone();
	let order = state
		.scoped(|cancel| async move { order::create_order(&engine, request, &cancel).await })
		.await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /orders requests.
///
/// Returns one page of orders. Pass the returned `next` value back as
/// `cursor` for the following page; `next` is absent on the last page.
async fn handle_list_orders(
	State(state): State<AppState>,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, APIError> {
	let cursor = order::parse_cursor(query.cursor.as_deref())?;
	let engine = state.engine.clone();
	let page = state
		.scoped(|cancel| async move { order::list_orders(&engine, cursor, &cancel).await })
		.await?;
	Ok(Json(page))
}

/// Handles GET /orders/{id} requests.
async fn handle_get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	let order_id = order::parse_order_id(&id)?;
	let engine = state.engine.clone();
	let order = state
		.scoped(|cancel| async move { order::get_order(&engine, order_id, &cancel).await })
		.await
		.inspect_err(|e| tracing::debug!(order_id, error = %e, "Order retrieval failed"))?;
	Ok(Json(order))
}

/// Handles PUT /orders/{id} requests.
async fn handle_update_order_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, APIError> {
	let order_id = order::parse_order_id(&id)?;
	let Json(request) = body.map_err(|e| InputError::InvalidBody(e.body_text()))?;
	let engine = state.engine.clone();
	let order = state
		.scoped(|cancel| async move {
			order::update_order_status(&engine, order_id, request, &cancel).await
		})
		.await
		.inspect_err(|e| tracing::warn!(order_id, error = %e, "Status update failed"))?;
	Ok(Json(order))
}

/// Handles DELETE /orders/{id} requests.
async fn handle_delete_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<StatusCode, APIError> {
	let order_id = order::parse_order_id(&id)?;
	let engine = state.engine.clone();
	state
		.scoped(|cancel| async move { order::delete_order(&engine, order_id, &cancel).await })
		.await?;
	Ok(StatusCode::OK)
}
