//! Integration test harness for the Bazaar storefront client.
//!
//! [`FakeBackend`] is an in-process axum server speaking the backend's REST
//! dialect: cookie sessions (`access_token="Bearer <token>"`), trailing-slash
//! collection routes and `{"detail": ...}` error bodies. Tests seed it,
//! point a [`Storefront`] at it, and inspect the request log afterwards.
//!
//! Fault injection covers what a real backend does to a client: expired
//! sessions, a refresh endpoint that refuses, per-route failures and slow
//! responses.
//!
//! # Example
//!
//! ```rust,ignore
//! let backend = FakeBackend::start().await;
//! let kettle = backend.seed_product("Kettle", Price::from_minor(199_000), 5);
//! backend.seed_user("ivan", "secret1", false);
//!
//! let storefront = backend.storefront();
//! storefront.sign_in("ivan", &SecretString::from("secret1")).await?;
//! storefront.cart().add(kettle.id, 2).await?;
//! assert_eq!(backend.count(&Method::POST, "/cart/"), 1);
//! ```

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Form, Json, Router};
use bazaar_core::{
    CartLineId, CategoryId, DeliveryMethod, OrderId, OrderStatus, PaymentMethod, Price, ProductId,
    UserId,
};
use bazaar_storefront::models::{
    Category, Order, OrderItem, OrderStatistics, OrderSummary, Product, ProductSpec, User,
    WireCartLine,
};
use bazaar_storefront::{Storefront, StorefrontConfig};
use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use axum::http::{Method, StatusCode};

/// Password of users seeded through [`FakeBackend::customer`] and
/// [`FakeBackend::admin`].
pub const DEFAULT_PASSWORD: &str = "secret1";

// =============================================================================
// Harness
// =============================================================================

/// One request as seen by the fake backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    /// Bearer token from the cookie, if any.
    pub token: Option<String>,
}

/// A running fake backend. Stops when dropped.
pub struct FakeBackend {
    url: String,
    backend: Arc<Backend>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let backend = Arc::new(Backend::default());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");

        let app = router(Arc::clone(&backend));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake backend crashed");
        });

        Self {
            url: format!("http://{addr}"),
            backend,
            server,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:54321`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Client configuration pointing at this backend.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let mut config =
            StorefrontConfig::for_api_url(&self.url).expect("Fake backend URL is valid");
        config.request_timeout = Duration::from_secs(5);
        config
    }

    /// A fresh storefront pointing at this backend.
    #[must_use]
    pub fn storefront(&self) -> Storefront {
        Storefront::new(self.config()).expect("Failed to build storefront")
    }

    /// Seed a customer and return a storefront signed in as them.
    pub async fn customer(&self, login: &str) -> (Storefront, User) {
        self.signed_in(login, false).await
    }

    /// Seed an administrator and return a storefront signed in as them.
    pub async fn admin(&self, login: &str) -> (Storefront, User) {
        self.signed_in(login, true).await
    }

    async fn signed_in(&self, login: &str, is_admin: bool) -> (Storefront, User) {
        self.seed_user(login, DEFAULT_PASSWORD, is_admin);
        let storefront = self.storefront();
        let user = storefront
            .sign_in(login, &SecretString::from(DEFAULT_PASSWORD))
            .await
            .expect("Sign-in against the fake backend failed");
        (storefront, user)
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub fn seed_user(&self, login: &str, password: &str, is_admin: bool) -> User {
        let mut data = self.backend.lock();
        let id = UserId::new(data.next_id());
        let user = User {
            id,
            login: login.to_string(),
            username: login.to_string(),
            email: format!("{login}@example.com"),
            is_admin,
        };
        data.users.insert(
            id,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    pub fn seed_category(&self, name: &str) -> Category {
        let mut data = self.backend.lock();
        let category = Category {
            id: CategoryId::new(data.next_id()),
            name: name.to_string(),
        };
        data.categories.insert(category.id, category.clone());
        category
    }

    /// Seed a product in a default category.
    pub fn seed_product(&self, name: &str, price: Price, stock: u32) -> Product {
        let category_id = self.default_category();
        let mut data = self.backend.lock();
        let product = Product {
            id: ProductId::new(data.next_id()),
            name: name.to_string(),
            description: String::new(),
            price,
            category_id,
            stock,
            image_url: String::new(),
        };
        data.products.insert(product.id, product.clone());
        product
    }

    pub fn seed_spec(&self, product_id: ProductId, name: &str, value: &str, order: u32) {
        let mut data = self.backend.lock();
        let id = data.next_id();
        data.specs.entry(product_id).or_default().push(ProductSpec {
            id: Some(id),
            spec_name: name.to_string(),
            spec_value: value.to_string(),
            order: Some(order),
        });
    }

    /// Put a line straight into a user's server-side cart.
    pub fn seed_cart_line(&self, user_id: UserId, product_id: ProductId, quantity: u32) -> WireCartLine {
        let mut data = self.backend.lock();
        let line = WireCartLine {
            id: CartLineId::new(data.next_id()),
            user_id: Some(user_id),
            product_id,
            quantity,
        };
        data.cart.push(line);
        line
    }

    /// Change a product behind the client's back.
    pub fn set_price(&self, product_id: ProductId, price: Price) {
        if let Some(product) = self.backend.lock().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub fn remove_product(&self, product_id: ProductId) {
        self.backend.lock().products.remove(&product_id);
    }

    /// Rename a user behind the client's back.
    pub fn set_username(&self, user_id: UserId, username: &str) {
        if let Some(account) = self.backend.lock().users.get_mut(&user_id) {
            account.user.username = username.to_string();
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn cart_of(&self, user_id: UserId) -> Vec<WireCartLine> {
        self.backend
            .lock()
            .cart
            .iter()
            .filter(|line| line.user_id == Some(user_id))
            .copied()
            .collect()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.backend.lock().orders.clone()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.backend.lock().log.clone()
    }

    /// Number of logged requests matching `method` and `path`.
    #[must_use]
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.backend
            .lock()
            .log
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    pub fn clear_log(&self) {
        self.backend.lock().log.clear();
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Every session issued so far starts answering 401. The refresh endpoint
    /// still accepts them.
    pub fn expire_sessions(&self) {
        for session in self.backend.lock().sessions.values_mut() {
            session.expired = true;
        }
    }

    /// Make `POST /users/refresh` answer 401.
    pub fn fail_refresh(&self, fail: bool) {
        self.backend.lock().refresh_disabled = fail;
    }

    /// Answer the next `times` matching requests with `status`.
    pub fn fail_next(&self, method: Method, path: &str, status: StatusCode, times: usize) {
        self.backend
            .lock()
            .faults
            .entry((method, path.to_string()))
            .or_default()
            .extend(std::iter::repeat_n(status, times));
    }

    /// Delay every matching request by `delay`.
    pub fn delay(&self, method: Method, path: &str, delay: Duration) {
        self.backend
            .lock()
            .latency
            .insert((method, path.to_string()), delay);
    }

    fn default_category(&self) -> CategoryId {
        let existing = self.backend.lock().categories.keys().next().copied();
        existing.unwrap_or_else(|| self.seed_category("General").id)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let addr: SocketAddr = listener.local_addr().expect("Probe listener has no address");
    drop(listener);
    format!("http://{addr}")
}

/// A storefront whose backend is down.
pub async fn offline_storefront() -> Storefront {
    let mut config = StorefrontConfig::for_api_url(&unreachable_url().await)
        .expect("Probe URL is valid");
    config.request_timeout = Duration::from_secs(2);
    Storefront::new(config).expect("Failed to build storefront")
}

// =============================================================================
// State
// =============================================================================

type RouteKey = (Method, String);

#[derive(Default)]
struct Backend {
    data: Mutex<Data>,
}

impl Backend {
    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Account {
    user: User,
    password: String,
}

struct SessionRecord {
    user_id: UserId,
    expired: bool,
}

#[derive(Default)]
struct Data {
    last_id: i64,
    users: BTreeMap<UserId, Account>,
    sessions: HashMap<String, SessionRecord>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    specs: HashMap<ProductId, Vec<ProductSpec>>,
    cart: Vec<WireCartLine>,
    orders: Vec<Order>,
    log: Vec<RecordedRequest>,
    faults: HashMap<RouteKey, VecDeque<StatusCode>>,
    latency: HashMap<RouteKey, Duration>,
    refresh_disabled: bool,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn issue_token(&mut self, user_id: UserId) -> String {
        let token = format!("tok-{}", self.next_id());
        self.sessions.insert(
            token.clone(),
            SessionRecord {
                user_id,
                expired: false,
            },
        );
        token
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<User, Rejection> {
        let token = bearer_token(headers)
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
        let session = self
            .sessions
            .get(&token)
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Could not validate credentials"))?;
        if session.expired {
            return Err(reject(StatusCode::UNAUTHORIZED, "Token has expired"));
        }
        self.users
            .get(&session.user_id)
            .map(|account| account.user.clone())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "User not found"))
    }

    fn authenticate_admin(&self, headers: &HeaderMap) -> Result<User, Rejection> {
        let user = self.authenticate(headers)?;
        if user.is_admin {
            Ok(user)
        } else {
            Err(reject(StatusCode::FORBIDDEN, "Admin rights required"))
        }
    }
}

type Rejection = (StatusCode, Json<Value>);

fn reject(status: StatusCode, detail: &str) -> Rejection {
    (status, Json(json!({ "detail": detail })))
}

/// Extract the token from `Cookie: access_token="Bearer <token>"`.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "access_token")
        .map(|(_, value)| value.trim_matches('"'))
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn session_cookie(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "access_token=\"Bearer {token}\"; HttpOnly; Path=/; SameSite=lax"
    ))
    .expect("Token is a valid header value")
}

fn token_response(token: &str) -> Response {
    let mut response = Json(json!({ "access_token": token, "token_type": "bearer" })).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, session_cookie(token));
    response
}

// =============================================================================
// Router
// =============================================================================

fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/refresh", post(refresh))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me))
        .route("/users/{id}/username", put(change_username))
        .route("/users/{id}/password", put(change_password))
        .route("/products/", get(list_products))
        .route("/products/with-specs", post(create_product))
        .route("/products/{id}", get(get_product).delete(delete_product))
        .route("/products/{id}/specs", get(product_specs))
        .route("/products/{id}/with-specs", put(update_product))
        .route("/categories/", get(list_categories).post(create_category))
        .route("/categories/{id}", put(rename_category).delete(delete_category))
        .route("/cart/", get(cart_lines).post(add_cart_line))
        .route("/cart/{id}", put(update_cart_line).delete(delete_cart_line))
        .route("/orders/", post(create_order))
        .route("/orders/my", get(my_orders))
        .route("/orders/my/{id}", get(my_order))
        .route("/orders/admin", get(admin_orders))
        .route("/orders/admin/statistics", get(order_statistics))
        .route("/orders/admin/{id}", get(admin_order))
        .route("/orders/admin/{id}/status", put(set_order_status))
        .route("/admin/users/", get(list_users))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/users/{id}/role", put(set_user_role))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&backend),
            intercept,
        ))
        .with_state(backend)
}

/// Log every request, then apply injected latency and failures.
async fn intercept(State(backend): State<Arc<Backend>>, request: Request, next: Next) -> Response {
    let key = (request.method().clone(), request.uri().path().to_string());
    let (delay, fault) = {
        let mut data = backend.lock();
        data.log.push(RecordedRequest {
            method: key.0.clone(),
            path: key.1.clone(),
            token: bearer_token(request.headers()),
        });
        let delay = data.latency.get(&key).copied();
        let fault = data.faults.get_mut(&key).and_then(VecDeque::pop_front);
        (delay, fault)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    match fault {
        Some(status) => reject(status, "Injected failure").into_response(),
        None => next.run(request).await,
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Deserialize)]
struct RegisterBody {
    login: String,
    username: String,
    email: String,
    password: String,
}

async fn register(State(backend): State<Arc<Backend>>, Json(body): Json<RegisterBody>) -> Response {
    let mut data = backend.lock();
    if data.users.values().any(|a| a.user.login == body.login) {
        return reject(StatusCode::BAD_REQUEST, "Login already exists").into_response();
    }
    let id = UserId::new(data.next_id());
    data.users.insert(
        id,
        Account {
            user: User {
                id,
                login: body.login,
                username: body.username,
                email: body.email,
                is_admin: false,
            },
            password: body.password,
        },
    );
    let token = data.issue_token(id);
    token_response(&token)
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(backend): State<Arc<Backend>>, Form(form): Form<LoginForm>) -> Response {
    let mut data = backend.lock();
    let user_id = data
        .users
        .values()
        .find(|a| a.user.login == form.username && a.password == form.password)
        .map(|a| a.user.id);
    match user_id {
        Some(id) => {
            let token = data.issue_token(id);
            token_response(&token)
        }
        None => reject(StatusCode::UNAUTHORIZED, "Incorrect login or password").into_response(),
    }
}

async fn refresh(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let mut data = backend.lock();
    if data.refresh_disabled {
        return reject(StatusCode::UNAUTHORIZED, "Refresh token expired").into_response();
    }
    let Some(old) = bearer_token(&headers) else {
        return reject(StatusCode::UNAUTHORIZED, "Not authenticated").into_response();
    };
    let Some(session) = data.sessions.remove(&old) else {
        return reject(StatusCode::UNAUTHORIZED, "Could not validate credentials").into_response();
    };
    let token = data.issue_token(session.user_id);
    token_response(&token)
}

async fn logout(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        backend.lock().sessions.remove(&token);
    }
    let mut response = Json(json!({ "message": "Successfully logged out" })).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("access_token=\"\"; Max-Age=0; Path=/"),
    );
    response
}

async fn me(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Result<Json<User>, Rejection> {
    backend.lock().authenticate(&headers).map(Json)
}

#[derive(Deserialize)]
struct UsernameBody {
    new_username: String,
}

async fn change_username(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(body): Json<UsernameBody>,
) -> Result<Json<User>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    if user.id != id {
        return Err(reject(StatusCode::FORBIDDEN, "Not allowed"));
    }
    let account = data
        .users
        .get_mut(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "User not found"))?;
    account.user.username = body.new_username;
    Ok(Json(account.user.clone()))
}

#[derive(Deserialize)]
struct PasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(body): Json<PasswordBody>,
) -> Result<Json<User>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    if user.id != id {
        return Err(reject(StatusCode::FORBIDDEN, "Not allowed"));
    }
    let account = data
        .users
        .get_mut(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "User not found"))?;
    if account.password != body.current_password {
        return Err(reject(StatusCode::BAD_REQUEST, "Incorrect current password"));
    }
    account.password = body.new_password;
    Ok(Json(account.user.clone()))
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Deserialize)]
struct ProductFilter {
    category_id: Option<CategoryId>,
    search: Option<String>,
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_products(
    State(backend): State<Arc<Backend>>,
    Query(filter): Query<ProductFilter>,
) -> Json<Vec<Product>> {
    let data = backend.lock();
    let search = filter.search.map(|s| s.to_lowercase());
    let products = data
        .products
        .values()
        .filter(|p| filter.category_id.is_none_or(|c| p.category_id == c))
        .filter(|p| {
            search
                .as_deref()
                .is_none_or(|s| p.name.to_lowercase().contains(s))
        })
        .skip(filter.skip.unwrap_or(0))
        .take(filter.limit.unwrap_or(100))
        .cloned()
        .collect();
    Json(products)
}

async fn get_product(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, Rejection> {
    backend
        .lock()
        .products
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Product not found"))
}

async fn product_specs(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<ProductId>,
) -> Result<Json<Vec<ProductSpec>>, Rejection> {
    let data = backend.lock();
    if !data.products.contains_key(&id) {
        return Err(reject(StatusCode::NOT_FOUND, "Product not found"));
    }
    Ok(Json(data.specs.get(&id).cloned().unwrap_or_default()))
}

#[derive(Deserialize)]
struct ProductBody {
    name: String,
    #[serde(default)]
    description: String,
    price: Price,
    category_id: CategoryId,
    #[serde(default)]
    stock: u32,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    specs: Vec<ProductSpec>,
}

impl ProductBody {
    fn into_product(self, id: ProductId) -> (Product, Vec<ProductSpec>) {
        let product = Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            category_id: self.category_id,
            stock: self.stock,
            image_url: self.image_url,
        };
        (product, self.specs)
    }
}

async fn create_product(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<ProductBody>,
) -> Result<Json<Product>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    let id = ProductId::new(data.next_id());
    let (product, specs) = body.into_product(id);
    data.products.insert(id, product.clone());
    data.specs.insert(id, specs);
    Ok(Json(product))
}

async fn update_product(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<ProductId>,
    Json(body): Json<ProductBody>,
) -> Result<Json<Product>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    if !data.products.contains_key(&id) {
        return Err(reject(StatusCode::NOT_FOUND, "Product not found"));
    }
    let (product, specs) = body.into_product(id);
    data.products.insert(id, product.clone());
    data.specs.insert(id, specs);
    Ok(Json(product))
}

async fn delete_product(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<ProductId>,
) -> Result<Json<Value>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    data.products
        .remove(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Product not found"))?;
    data.specs.remove(&id);
    Ok(Json(json!({ "message": "Product deleted" })))
}

async fn list_categories(State(backend): State<Arc<Backend>>) -> Json<Vec<Category>> {
    Json(backend.lock().categories.values().cloned().collect())
}

#[derive(Deserialize)]
struct CategoryBody {
    name: String,
}

async fn create_category(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<CategoryBody>,
) -> Result<Json<Category>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    let category = Category {
        id: CategoryId::new(data.next_id()),
        name: body.name,
    };
    data.categories.insert(category.id, category.clone());
    Ok(Json(category))
}

async fn rename_category(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<CategoryId>,
    Json(body): Json<CategoryBody>,
) -> Result<Json<Category>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    let category = data
        .categories
        .get_mut(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Category not found"))?;
    category.name = body.name;
    Ok(Json(category.clone()))
}

async fn delete_category(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<CategoryId>,
) -> Result<Json<Value>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    if data.products.values().any(|p| p.category_id == id) {
        return Err(reject(StatusCode::BAD_REQUEST, "Category has products"));
    }
    data.categories
        .remove(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Category not found"))?;
    Ok(Json(json!({ "message": "Category deleted" })))
}

// =============================================================================
// Cart
// =============================================================================

async fn cart_lines(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
) -> Result<Json<Vec<WireCartLine>>, Rejection> {
    let data = backend.lock();
    let user = data.authenticate(&headers)?;
    Ok(Json(
        data.cart
            .iter()
            .filter(|line| line.user_id == Some(user.id))
            .copied()
            .collect(),
    ))
}

#[derive(Deserialize)]
struct CartAddBody {
    product_id: ProductId,
    quantity: u32,
}

async fn add_cart_line(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<CartAddBody>,
) -> Result<Json<WireCartLine>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    if !data.products.contains_key(&body.product_id) {
        return Err(reject(StatusCode::NOT_FOUND, "Product not found"));
    }

    if let Some(line) = data
        .cart
        .iter_mut()
        .find(|l| l.user_id == Some(user.id) && l.product_id == body.product_id)
    {
        line.quantity += body.quantity;
        return Ok(Json(*line));
    }

    let line = WireCartLine {
        id: CartLineId::new(data.next_id()),
        user_id: Some(user.id),
        product_id: body.product_id,
        quantity: body.quantity,
    };
    data.cart.push(line);
    Ok(Json(line))
}

#[derive(Deserialize)]
struct CartQuantityBody {
    quantity: u32,
}

async fn update_cart_line(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<CartLineId>,
    Json(body): Json<CartQuantityBody>,
) -> Result<Json<WireCartLine>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    let line = data
        .cart
        .iter_mut()
        .find(|l| l.id == id && l.user_id == Some(user.id))
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Cart item not found"))?;
    line.quantity = body.quantity;
    Ok(Json(*line))
}

async fn delete_cart_line(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<CartLineId>,
) -> Result<Json<Value>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    let before = data.cart.len();
    data.cart
        .retain(|l| !(l.id == id && l.user_id == Some(user.id)));
    if data.cart.len() == before {
        return Err(reject(StatusCode::NOT_FOUND, "Cart item not found"));
    }
    Ok(Json(json!({ "message": "Item removed from cart" })))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Deserialize)]
struct OrderItemBody {
    product_id: ProductId,
    quantity: u32,
    price: Price,
}

#[derive(Deserialize)]
struct OrderBody {
    items: Vec<OrderItemBody>,
    delivery_address: String,
    delivery_phone: String,
    delivery_method: DeliveryMethod,
    payment_method: PaymentMethod,
    notes: Option<String>,
}

async fn create_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<OrderBody>,
) -> Result<Json<Order>, Rejection> {
    let mut data = backend.lock();
    let user = data.authenticate(&headers)?;
    if body.items.is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Order must contain at least one item",
        ));
    }

    let items: Vec<OrderItem> = body
        .items
        .iter()
        .map(|item| OrderItem {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            product_name: data.products.get(&item.product_id).map(|p| p.name.clone()),
        })
        .collect();
    let id = data.next_id();
    let order = Order {
        id: OrderId::new(id),
        order_number: Some(format!("ORD-{id:05}")),
        user_id: Some(user.id),
        status: OrderStatus::Pending,
        total_price: items.iter().map(|i| i.price.times(i.quantity)).sum(),
        created_at: Utc::now(),
        delivery_address: body.delivery_address,
        delivery_phone: body.delivery_phone,
        delivery_method: body.delivery_method,
        payment_method: body.payment_method,
        notes: body.notes,
        items,
    };
    data.orders.push(order.clone());
    Ok(Json(order))
}

#[derive(Deserialize)]
struct OrderFilter {
    skip: Option<usize>,
    limit: Option<usize>,
    status: Option<OrderStatus>,
}

fn summarize(orders: &[Order], filter: &OrderFilter, owner: Option<UserId>) -> Vec<OrderSummary> {
    orders
        .iter()
        .rev()
        .filter(|o| owner.is_none_or(|u| o.user_id == Some(u)))
        .filter(|o| filter.status.is_none_or(|s| o.status == s))
        .skip(filter.skip.unwrap_or(0))
        .take(filter.limit.unwrap_or(100))
        .map(|o| OrderSummary {
            id: o.id,
            order_number: o.order_number.clone(),
            status: o.status,
            total_price: o.total_price,
            created_at: o.created_at,
            items_count: u32::try_from(o.items.len()).ok(),
        })
        .collect()
}

async fn my_orders(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderSummary>>, Rejection> {
    let data = backend.lock();
    let user = data.authenticate(&headers)?;
    Ok(Json(summarize(&data.orders, &filter, Some(user.id))))
}

async fn my_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, Rejection> {
    let data = backend.lock();
    let user = data.authenticate(&headers)?;
    let order = data
        .orders
        .iter()
        .find(|o| o.id == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Order not found"))?;
    if order.user_id != Some(user.id) {
        return Err(reject(StatusCode::FORBIDDEN, "No access to this order"));
    }
    Ok(Json(order.clone()))
}

async fn admin_orders(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderSummary>>, Rejection> {
    let data = backend.lock();
    data.authenticate_admin(&headers)?;
    Ok(Json(summarize(&data.orders, &filter, None)))
}

async fn admin_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, Rejection> {
    let data = backend.lock();
    data.authenticate_admin(&headers)?;
    data.orders
        .iter()
        .find(|o| o.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Order not found"))
}

#[derive(Deserialize)]
struct StatusQuery {
    status: OrderStatus,
}

async fn set_order_status(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<OrderId>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    let order = data
        .orders
        .iter_mut()
        .find(|o| o.id == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Order not found"))?;
    order.status = query.status;
    Ok(Json(json!({ "message": "Order status updated" })))
}

async fn order_statistics(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
) -> Result<Json<OrderStatistics>, Rejection> {
    let data = backend.lock();
    data.authenticate_admin(&headers)?;
    let count = |status: OrderStatus| data.orders.iter().filter(|o| o.status == status).count() as u64;
    Ok(Json(OrderStatistics {
        total_orders: data.orders.len() as u64,
        pending_orders: count(OrderStatus::Pending),
        delivered_orders: count(OrderStatus::Delivered),
        total_revenue: data
            .orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .map(|o| o.total_price)
            .sum(),
    }))
}

// =============================================================================
// Admin: users
// =============================================================================

async fn list_users(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, Rejection> {
    let data = backend.lock();
    data.authenticate_admin(&headers)?;
    Ok(Json(data.users.values().map(|a| a.user.clone()).collect()))
}

#[derive(Deserialize)]
struct RoleBody {
    is_admin: bool,
}

async fn set_user_role(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
    Json(body): Json<RoleBody>,
) -> Result<Json<User>, Rejection> {
    let mut data = backend.lock();
    data.authenticate_admin(&headers)?;
    let account = data
        .users
        .get_mut(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "User not found"))?;
    account.user.is_admin = body.is_admin;
    Ok(Json(account.user.clone()))
}

async fn delete_user(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<UserId>,
) -> Result<Json<Value>, Rejection> {
    let mut data = backend.lock();
    let admin = data.authenticate_admin(&headers)?;
    if admin.id == id {
        return Err(reject(StatusCode::BAD_REQUEST, "Cannot delete yourself"));
    }
    data.users
        .remove(&id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "User not found"))?;
    data.sessions.retain(|_, s| s.user_id != id);
    data.cart.retain(|l| l.user_id != Some(id));
    Ok(Json(json!({ "message": "User deleted" })))
}
