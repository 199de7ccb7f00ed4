//! Integration test harness for the storefront client.
//!
//! [`MockBackend`] is an in-process axum server speaking the storefront REST
//! API (FastAPI-style `{"detail": ...}` errors included). It binds to an
//! ephemeral port on `127.0.0.1`, keeps all state in memory, records every
//! request it receives, and can be told to fail the next call to a route.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storefront-integration-tests
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_integration_tests::MockBackend;
//! use storefront_core::UserRole;
//!
//! # async fn example() {
//! let backend = MockBackend::start().await;
//! backend.add_user("ann@example.com", "ann", "secret", UserRole::Customer);
//! let (storefront, _store) = backend.storefront();
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use storefront_client::{ClientConfig, MemoryTokenStore, Storefront, TokenStore};
use storefront_core::UserRole;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone)]
struct UserRecord {
    id: i64,
    email: String,
    username: String,
    password: String,
    role: UserRole,
}

impl UserRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "username": self.username,
            "role": self.role,
        })
    }
}

#[derive(Debug, Clone)]
struct ProductRecord {
    id: i64,
    name: String,
    description: String,
    price: f64,
    stock: i64,
    category: String,
    image_url: Option<String>,
    vendor_id: Option<i64>,
    is_active: bool,
}

impl ProductRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "price": self.price,
            "stock": self.stock,
            "category": self.category,
            "image_url": self.image_url,
            "vendor_id": self.vendor_id,
            "is_active": self.is_active,
        })
    }
}

#[derive(Debug, Clone)]
struct CartLine {
    id: i64,
    user_id: i64,
    product_id: i64,
    quantity: i64,
}

#[derive(Debug, Clone)]
struct OrderRecord {
    id: i64,
    user_id: i64,
    total_amount: f64,
    status: String,
    created_at: String,
    payment_intent_id: String,
    items: Vec<OrderLine>,
}

#[derive(Debug, Clone)]
struct OrderLine {
    id: i64,
    product_id: i64,
    quantity: i64,
    price: f64,
}

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    /// Bearer token, without the `Bearer ` prefix.
    pub bearer: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    method: Method,
    path: String,
    status: StatusCode,
    detail: String,
}

#[derive(Debug, Default)]
struct BackendState {
    users: Vec<UserRecord>,
    products: Vec<ProductRecord>,
    cart: Vec<CartLine>,
    orders: Vec<OrderRecord>,
    access_tokens: HashMap<String, i64>,
    refresh_tokens: HashMap<String, i64>,
    requests: Vec<RecordedRequest>,
    failures: VecDeque<InjectedFailure>,
    next_id: i64,
}

impl BackendState {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_tokens(&mut self, user_id: i64) -> Value {
        let n = self.next_id();
        let access = format!("access-{user_id}-{n}");
        let refresh = format!("refresh-{user_id}-{n}");
        self.access_tokens.insert(access.clone(), user_id);
        self.refresh_tokens.insert(refresh.clone(), user_id);
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
        })
    }

    fn user(&self, id: i64) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.id == id)
    }

    fn product(&self, id: i64) -> Option<&ProductRecord> {
        self.products.iter().find(|product| product.id == id)
    }

    fn cart_json(&self, user_id: i64) -> Value {
        let items: Vec<Value> = self
            .cart
            .iter()
            .filter(|line| line.user_id == user_id)
            .filter_map(|line| {
                let product = self.product(line.product_id)?;
                Some(json!({
                    "id": line.id,
                    "product_id": line.product_id,
                    "quantity": line.quantity,
                    "product": {
                        "id": product.id,
                        "name": product.name,
                        "price": product.price,
                        "image_url": product.image_url,
                    },
                }))
            })
            .collect();
        json!({
            "items": items,
            // Deliberately wrong aggregates; the client must recompute them.
            "total": -1.0,
            "item_count": -1,
        })
    }

    fn order_json(&self, order: &OrderRecord) -> Value {
        let items: Vec<Value> = order
            .items
            .iter()
            .map(|line| {
                let product = self.product(line.product_id);
                json!({
                    "id": line.id,
                    "product_id": line.product_id,
                    "quantity": line.quantity,
                    "price": line.price,
                    "product_name": product.map(|p| p.name.clone()).unwrap_or_default(),
                    "image_url": product.and_then(|p| p.image_url.clone()),
                })
            })
            .collect();
        json!({
            "id": order.id,
            "total_amount": order.total_amount,
            "status": order.status,
            "created_at": order.created_at,
            "payment_intent_id": order.payment_intent_id,
            "items": items,
        })
    }
}

type Shared = Arc<Mutex<BackendState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Errors
// =============================================================================

/// FastAPI-style error: `{"detail": "..."}`.
struct ApiError(StatusCode, String);

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self(status, detail.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn authenticate(state: &BackendState, headers: &HeaderMap) -> Result<UserRecord, ApiError> {
    let unauthorized = || ApiError::new(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    let token = bearer(headers).ok_or_else(unauthorized)?;
    let user_id = state.access_tokens.get(&token).ok_or_else(unauthorized)?;
    state.user(*user_id).cloned().ok_or_else(unauthorized)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn can_manage_products(role: UserRole) -> bool {
    matches!(role, UserRole::Vendor | UserRole::Admin)
}

// =============================================================================
// Handlers: auth
// =============================================================================

#[derive(Deserialize)]
struct SignupBody {
    email: String,
    username: String,
    password: String,
    #[serde(default)]
    role: UserRole,
}

async fn signup(State(state): State<Shared>, Json(body): Json<SignupBody>) -> ApiResult {
    let mut state = lock(&state);
    if state.users.iter().any(|u| u.email == body.email) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Email already registered"));
    }
    if state.users.iter().any(|u| u.username == body.username) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Username already taken"));
    }
    let id = state.next_id();
    state.users.push(UserRecord {
        id,
        email: body.email,
        username: body.username,
        password: body.password,
        role: body.role,
    });
    Ok(Json(json!({ "message": "User created successfully", "user_id": id })))
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn token(State(state): State<Shared>, Json(body): Json<LoginBody>) -> ApiResult {
    let mut state = lock(&state);
    let user_id = state
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .map(|u| u.id)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Incorrect email or password"))?;
    Ok(Json(state.issue_tokens(user_id)))
}

async fn refresh(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let mut state = lock(&state);
    let invalid = || ApiError::new(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    let presented = params.get("refresh_token").ok_or_else(invalid)?;
    let user_id = state.refresh_tokens.remove(presented).ok_or_else(invalid)?;
    Ok(Json(state.issue_tokens(user_id)))
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> ApiResult {
    let state = lock(&state);
    Ok(Json(authenticate(&state, &headers)?.to_json()))
}

#[derive(Deserialize)]
struct ProfileBody {
    username: Option<String>,
    email: Option<String>,
}

async fn update_profile(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    if let Some(email) = &body.email {
        if state.users.iter().any(|u| &u.email == email && u.id != user.id) {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "Email already registered"));
        }
    }
    if let Some(username) = &body.username {
        if state.users.iter().any(|u| &u.username == username && u.id != user.id) {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "Username already taken"));
        }
    }
    let record = state
        .users
        .iter_mut()
        .find(|u| u.id == user.id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "User not found"))?;
    if let Some(email) = body.email {
        record.email = email;
    }
    if let Some(username) = body.username {
        record.username = username;
    }
    Ok(Json(record.to_json()))
}

#[derive(Deserialize)]
struct PasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PasswordBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    if user.password != body.current_password {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Incorrect current password"));
    }
    if let Some(record) = state.users.iter_mut().find(|u| u.id == user.id) {
        record.password = body.new_password;
    }
    Ok(Json(json!({ "message": "Password updated successfully" })))
}

// =============================================================================
// Handlers: catalog
// =============================================================================

#[derive(Deserialize)]
struct ProductParams {
    search: Option<String>,
    category: Option<String>,
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

const fn default_limit() -> usize {
    20
}

async fn list_products(
    State(state): State<Shared>,
    Query(params): Query<ProductParams>,
) -> ApiResult {
    let state = lock(&state);
    let search = params.search.map(|s| s.to_lowercase());
    let matching: Vec<&ProductRecord> = state
        .products
        .iter()
        .filter(|p| p.is_active)
        .filter(|p| {
            search
                .as_deref()
                .is_none_or(|s| p.name.to_lowercase().contains(s))
        })
        .filter(|p| params.category.as_deref().is_none_or(|c| p.category == c))
        .collect();
    let page: Vec<Value> = matching
        .iter()
        .skip(params.skip)
        .take(params.limit)
        .map(|p| p.to_json())
        .collect();
    Ok(Json(json!({
        "products": page,
        "total": matching.len(),
        "skip": params.skip,
        "limit": params.limit,
    })))
}

async fn get_product(State(state): State<Shared>, Path(id): Path<i64>) -> ApiResult {
    let state = lock(&state);
    state
        .product(id)
        .map(|p| Json(p.to_json()))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Product not found"))
}

#[derive(Deserialize)]
struct ProductBody {
    name: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    stock: Option<i64>,
    category: Option<String>,
    image_url: Option<String>,
}

async fn create_product(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ProductBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    if !can_manage_products(user.role) {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Not authorized to create products"));
    }
    let (Some(name), Some(price)) = (body.name, body.price) else {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "name and price are required"));
    };
    let id = state.next_id();
    let product = ProductRecord {
        id,
        name,
        description: body.description.unwrap_or_default(),
        price,
        stock: body.stock.unwrap_or_default(),
        category: body.category.unwrap_or_default(),
        image_url: body.image_url,
        vendor_id: Some(user.id),
        is_active: true,
    };
    let json = product.to_json();
    state.products.push(product);
    Ok(Json(json))
}

fn owned_product_mut<'a>(
    state: &'a mut BackendState,
    user: &UserRecord,
    id: i64,
    action: &str,
) -> Result<&'a mut ProductRecord, ApiError> {
    if !can_manage_products(user.role) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            format!("Not authorized to {action} products"),
        ));
    }
    let product = state
        .products
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Product not found"))?;
    if user.role != UserRole::Admin && product.vendor_id != Some(user.id) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            format!("Not authorized to {action} this product"),
        ));
    }
    Ok(product)
}

async fn update_product(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<ProductBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let product = owned_product_mut(&mut state, &user, id, "update")?;
    if let Some(name) = body.name {
        product.name = name;
    }
    if let Some(description) = body.description {
        product.description = description;
    }
    if let Some(price) = body.price {
        product.price = price;
    }
    if let Some(stock) = body.stock {
        product.stock = stock;
    }
    if let Some(category) = body.category {
        product.category = category;
    }
    if body.image_url.is_some() {
        product.image_url = body.image_url;
    }
    Ok(Json(product.to_json()))
}

async fn delete_product(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    owned_product_mut(&mut state, &user, id, "delete")?;
    state.products.retain(|p| p.id != id);
    Ok(Json(json!({ "message": "Product deleted successfully" })))
}

// =============================================================================
// Handlers: cart
// =============================================================================

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> ApiResult {
    let state = lock(&state);
    let user = authenticate(&state, &headers)?;
    Ok(Json(state.cart_json(user.id)))
}

#[derive(Deserialize)]
struct AddItemBody {
    product_id: i64,
    quantity: i64,
}

async fn add_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let stock = state
        .product(body.product_id)
        .map(|p| p.stock)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Product not found"))?;

    let existing = state
        .cart
        .iter()
        .position(|l| l.user_id == user.id && l.product_id == body.product_id);
    let already = existing
        .and_then(|i| state.cart.get(i))
        .map_or(0, |l| l.quantity);
    if already + body.quantity > stock {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Insufficient stock"));
    }

    if let Some(line) = existing.and_then(|i| state.cart.get_mut(i)) {
        line.quantity += body.quantity;
    } else {
        let id = state.next_id();
        state.cart.push(CartLine {
            id,
            user_id: user.id,
            product_id: body.product_id,
            quantity: body.quantity,
        });
    }
    Ok(Json(json!({ "message": "Item added to cart" })))
}

#[derive(Deserialize)]
struct UpdateItemBody {
    quantity: i64,
}

async fn update_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateItemBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let line = state
        .cart
        .iter()
        .find(|l| l.id == id && l.user_id == user.id)
        .cloned()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Cart item not found"))?;
    if body.quantity < 1 {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive"));
    }
    if state.product(line.product_id).is_none_or(|p| p.stock < body.quantity) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Insufficient stock"));
    }
    if let Some(line) = state.cart.iter_mut().find(|l| l.id == id) {
        line.quantity = body.quantity;
    }
    Ok(Json(json!({ "message": "Cart item updated" })))
}

async fn delete_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let before = state.cart.len();
    state.cart.retain(|l| !(l.id == id && l.user_id == user.id));
    if state.cart.len() == before {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Cart item not found"));
    }
    Ok(Json(json!({ "message": "Item removed from cart" })))
}

// =============================================================================
// Handlers: checkout & orders
// =============================================================================

#[derive(Deserialize)]
struct CheckoutBody {
    #[serde(default)]
    payment_method: Option<String>,
}

#[allow(clippy::cast_precision_loss)]
async fn checkout(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CheckoutBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let lines: Vec<CartLine> = state
        .cart
        .iter()
        .filter(|l| l.user_id == user.id)
        .cloned()
        .collect();
    if lines.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Cart is empty"));
    }

    let mut items = Vec::with_capacity(lines.len());
    let mut total = 0.0;
    for line in &lines {
        let price = state.product(line.product_id).map_or(0.0, |p| p.price);
        total += price * line.quantity as f64;
        let id = state.next_id();
        items.push(OrderLine {
            id,
            product_id: line.product_id,
            quantity: line.quantity,
            price,
        });
    }

    let id = state.next_id();
    let method = body.payment_method.unwrap_or_else(|| "card".to_string());
    let order = OrderRecord {
        id,
        user_id: user.id,
        total_amount: total,
        status: "created".to_string(),
        created_at: chrono::Utc::now()
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string(),
        payment_intent_id: format!("pi_{method}_{id}"),
        items,
    };
    let receipt = json!({
        "order_id": order.id,
        "total_amount": order.total_amount,
        "payment_intent_id": order.payment_intent_id,
        "status": "created",
    });
    state.orders.push(order);
    state.cart.retain(|l| l.user_id != user.id);
    Ok(Json(receipt))
}

#[derive(Deserialize)]
struct ExecuteBody {
    payment_id: String,
    payer_id: String,
}

async fn execute_payment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    if body.payer_id.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Payer ID is required"));
    }
    let order = state
        .orders
        .iter_mut()
        .find(|o| o.user_id == user.id && o.payment_intent_id == body.payment_id)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Payment not found"))?;
    order.status = "confirmed".to_string();
    Ok(Json(json!({ "order_id": order.id, "payment_id": body.payment_id })))
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> ApiResult {
    let state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let mut orders: Vec<&OrderRecord> =
        state.orders.iter().filter(|o| o.user_id == user.id).collect();
    orders.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(Json(Value::Array(
        orders.into_iter().map(|o| state.order_json(o)).collect(),
    )))
}

async fn get_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    let state = lock(&state);
    let user = authenticate(&state, &headers)?;
    state
        .orders
        .iter()
        .find(|o| o.id == id && o.user_id == user.id)
        .map(|o| Json(state.order_json(o)))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Order not found"))
}

async fn cancel_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    let order = state
        .orders
        .iter_mut()
        .find(|o| o.id == id && o.user_id == user.id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Order not found"))?;
    if order.status != "created" {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Cannot cancel order that is not in created status",
        ));
    }
    order.status = "cancelled".to_string();
    Ok(Json(json!({ "message": "Order cancelled successfully" })))
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

async fn update_order_status(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> ApiResult {
    let mut state = lock(&state);
    let user = authenticate(&state, &headers)?;
    if !can_manage_products(user.role) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Not authorized to update order status",
        ));
    }
    let order = state
        .orders
        .iter_mut()
        .find(|o| o.id == id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Order not found"))?;
    order.status.clone_from(&body.status);
    Ok(Json(json!({ "message": format!("Order status updated to {}", body.status) })))
}

// =============================================================================
// Request log & failure injection
// =============================================================================

async fn record_request(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let injected = {
        let mut state = lock(&state);
        let headers = request.headers();
        state.requests.push(RecordedRequest {
            method: request.method().clone(),
            path: request.uri().path().to_owned(),
            query: request.uri().query().map(str::to_owned),
            bearer: bearer(headers),
            request_id: headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        });
        let position = state
            .failures
            .iter()
            .position(|f| f.method == request.method() && f.path == request.uri().path());
        position.and_then(|i| state.failures.remove(i))
    };

    match injected {
        Some(failure) => ApiError(failure.status, failure.detail).into_response(),
        None => next.run(request).await,
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/token", post(token))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/auth/profile", put(update_profile))
        .route("/auth/password", put(change_password))
        .route("/products", get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/vendor/products", post(create_product))
        .route(
            "/vendor/products/{id}",
            put(update_product).delete(delete_product),
        )
        .route("/cart", get(get_cart))
        .route("/cart/items", post(add_cart_item))
        .route(
            "/cart/items/{id}",
            put(update_cart_item).delete(delete_cart_item),
        )
        .route("/checkout", post(checkout))
        .route("/payment/execute", post(execute_payment))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", put(cancel_order))
        .route("/orders/{id}/status", put(update_order_status))
        .layer(middleware::from_fn_with_state(state.clone(), record_request))
        .with_state(state)
}

// =============================================================================
// Public harness
// =============================================================================

/// In-process storefront backend bound to an ephemeral local port.
///
/// The server task is aborted when the value is dropped.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind to `127.0.0.1:0` and start serving.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    #[allow(clippy::expect_used)]
    pub async fn start() -> Self {
        let state = Shared::default();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("mock backend has no address");
        let app = router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("mock backend stopped: {e}");
            }
        });
        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:54321`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Panics
    ///
    /// Never in practice; the URL is always well formed.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.url()).expect("mock backend URL is valid")
    }

    /// A fresh client with an empty in-memory token store.
    #[must_use]
    pub fn storefront(&self) -> (Storefront, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (self.storefront_with_store(store.clone()), store)
    }

    /// A fresh client over `store`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn storefront_with_store(&self, store: Arc<dyn TokenStore>) -> Storefront {
        Storefront::new(&self.config(), store).expect("failed to build storefront client")
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Register a user directly; returns the user ID.
    pub fn add_user(&self, email: &str, username: &str, password: &str, role: UserRole) -> i64 {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.users.push(UserRecord {
            id,
            email: email.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
            role,
        });
        id
    }

    /// List an active product; returns the product ID.
    pub fn add_product(
        &self,
        name: &str,
        price: f64,
        stock: i64,
        category: &str,
        vendor_id: Option<i64>,
    ) -> i64 {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.products.push(ProductRecord {
            id,
            name: name.to_owned(),
            description: format!("{name} description"),
            price,
            stock,
            category: category.to_owned(),
            image_url: None,
            vendor_id,
            is_active: true,
        });
        id
    }

    /// Put a line straight into a user's server-side cart; returns the line ID.
    pub fn add_cart_line(&self, user_id: i64, product_id: i64, quantity: i64) -> i64 {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.cart.push(CartLine {
            id,
            user_id,
            product_id,
            quantity,
        });
        id
    }

    /// Force an order's status, as fulfillment would.
    pub fn set_order_status(&self, order_id: i64, status: &str) {
        let mut state = lock(&self.state);
        if let Some(order) = state.orders.iter_mut().find(|o| o.id == order_id) {
            order.status = status.to_owned();
        }
    }

    /// Status of an order as stored by the backend.
    #[must_use]
    pub fn order_status(&self, order_id: i64) -> Option<String> {
        lock(&self.state)
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.status.clone())
    }

    /// Server-side cart lines of a user as `(product_id, quantity)`.
    #[must_use]
    pub fn cart_lines(&self, user_id: i64) -> Vec<(i64, i64)> {
        lock(&self.state)
            .cart
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| (l.product_id, l.quantity))
            .collect()
    }

    /// Stored product price and stock.
    #[must_use]
    pub fn product_snapshot(&self, product_id: i64) -> Option<(String, f64, i64)> {
        lock(&self.state)
            .product(product_id)
            .map(|p| (p.name.clone(), p.price, p.stock))
    }

    /// Mint a token pair for a user without going through login.
    #[must_use]
    pub fn issue_tokens(&self, user_id: i64) -> (String, String) {
        let grant = lock(&self.state).issue_tokens(user_id);
        (
            grant["access_token"].as_str().unwrap_or_default().to_owned(),
            grant["refresh_token"].as_str().unwrap_or_default().to_owned(),
        )
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Invalidate every access token; refresh tokens keep working.
    pub fn expire_access_tokens(&self) {
        lock(&self.state).access_tokens.clear();
    }

    /// Invalidate every access and refresh token.
    pub fn revoke_all_tokens(&self) {
        let mut state = lock(&self.state);
        state.access_tokens.clear();
        state.refresh_tokens.clear();
    }

    /// Answer the next `method path` request with `status` and `detail`.
    pub fn fail_next(&self, method: Method, path: &str, status: StatusCode, detail: &str) {
        lock(&self.state).failures.push_back(InjectedFailure {
            method,
            path: path.to_owned(),
            status,
            detail: detail.to_owned(),
        });
    }

    // -------------------------------------------------------------------------
    // Request log
    // -------------------------------------------------------------------------

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Number of `method path` requests received so far.
    #[must_use]
    pub fn count(&self, method: &Method, path: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    /// Forget the request log.
    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
