//! HTTP client for the Product resource.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use product_types::{Product, ProductUpdate};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::ApiError;
use crate::config::{AuthToken, ClientConfig, normalize_base_url};

const USER_AGENT: &str = concat!("product-api/", env!("CARGO_PKG_VERSION"));

/// Characters left unescaped in a single path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Thin wrapper around a configured `reqwest::Client` for the Product API.
///
/// Default headers carry the bearer token and `Accept: application/json`;
/// every path is resolved against the validated base URL. The client keeps no
/// other state between calls.
#[derive(Debug, Clone)]
pub struct ProductClient {
    base_url: String,
    http: Client,
}

impl ProductClient {
    /// Build a client for `base_url` authenticating with `token`.
    pub fn new(base_url: &str, token: AuthToken) -> Result<Self, ApiError> {
        Self::from_config(ClientConfig::new(base_url, token))
    }

    /// Build a client from `PRODUCT_API_BASE_URL` and `PRODUCT_API_TOKEN`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_config(ClientConfig::from_env()?)
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut authorization =
            HeaderValue::from_str(&config.token.bearer_header()).map_err(|error| ApiError::invalid_token(error.to_string()))?;
        authorization.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::AUTHORIZATION, authorization);
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder().default_headers(default_headers).user_agent(USER_AGENT).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /product/{id}`.
    ///
    /// A missing product comes back as `ApiError::RequestFailed` with status 404.
    pub async fn get_product(&self, id: &str) -> Result<Product, ApiError> {
        let path = product_path(id)?;
        self.send(self.request(Method::GET, &path)).await
    }

    /// `GET /products`, preserving the order the provider returned.
    pub async fn get_all_products(&self) -> Result<Vec<Product>, ApiError> {
        self.send(self.request(Method::GET, "/products")).await
    }

    /// `POST /product/{id}` with `update` as the JSON body, returning the updated product.
    pub async fn post_product(&self, id: &str, update: &ProductUpdate) -> Result<Product, ApiError> {
        let path = product_path(id)?;
        self.send(self.request(Method::POST, &path).json(update)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "building request");
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), bytes = text.len(), "received response");

        if !status.is_success() {
            return Err(ApiError::request_failed(status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|source| ApiError::decode(status.as_u16(), source, &text))
    }
}

fn product_path(id: &str) -> Result<String, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::EmptyProductId);
    }
    Ok(format!("/product/{}", utf8_percent_encode(id, PATH_SEGMENT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap as AxumHeaders, Method as AxumMethod, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::{Value, json};

    use crate::config::{BASE_URL_ENV, TOKEN_ENV};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{address}")
    }

    /// Reflects the request line and auth header back as a product.
    async fn echo(method: AxumMethod, uri: Uri, headers: AxumHeaders, body: String) -> axum::Json<Value> {
        let authorization = headers.get("authorization").and_then(|value| value.to_str().ok()).unwrap_or_default();
        axum::Json(json!({
            "id": uri.path(),
            "type": method.as_str(),
            "name": authorization,
            "body": body,
        }))
    }

    fn client(base_url: &str) -> ProductClient {
        ProductClient::new(base_url, AuthToken::new("token-123").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn get_product_sends_bearer_header() {
        let base_url = serve(Router::new().fallback(echo)).await;
        let product = client(&base_url).get_product("10").await.unwrap();
        assert_eq!(product.id.as_deref(), Some("/product/10"));
        assert_eq!(product.kind.as_deref(), Some("GET"));
        assert_eq!(product.name.as_deref(), Some("Bearer token-123"));
    }

    #[tokio::test]
    async fn product_id_is_a_single_encoded_segment() {
        let base_url = serve(Router::new().fallback(echo)).await;
        let product = client(&base_url).get_product("a b/c").await.unwrap();
        assert_eq!(product.id.as_deref(), Some("/product/a%20b%2Fc"));
    }

    #[tokio::test]
    async fn post_product_sends_update_body() {
        let base_url = serve(Router::new().fallback(echo)).await;
        let update = ProductUpdate::default().with_kind("LOAN_CARD").with_price(65.0);
        let product = client(&base_url).post_product("10", &update).await.unwrap();
        assert_eq!(product.kind.as_deref(), Some("POST"));
        let sent: Value = serde_json::from_str(product.extra["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent, json!({"type": "LOAN_CARD", "price": 65.0}));
    }

    #[tokio::test]
    async fn get_all_products_preserves_order() {
        let router = Router::new().route(
            "/products",
            get(|| async { axum::Json(json!([{"id": "2"}, {"id": "1"}, {"id": "3"}])) }),
        );
        let base_url = serve(router).await;
        let products = client(&base_url).get_all_products().await.unwrap();
        let ids: Vec<_> = products.iter().map(|product| product.id.as_deref().unwrap()).collect();
        assert_eq!(ids, ["2", "1", "3"]);
    }

    #[tokio::test]
    async fn non_success_status_is_request_failed() {
        let router = Router::new()
            .route("/product/11", get(|| async { (StatusCode::NOT_FOUND, "missing").into_response() }))
            .route("/products", get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }));
        let base_url = serve(router).await;
        let client = client(&base_url);

        let error = client.get_product("11").await.unwrap_err();
        assert_eq!(error.to_string(), "Request failed with status code 404");
        assert!(matches!(error, ApiError::RequestFailed { status: 404, ref body } if body == "missing"));

        let error = client.get_all_products().await.unwrap_err();
        assert_eq!(error.status(), Some(500));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let router = Router::new().route("/product/10", get(|| async { "<html>" }));
        let base_url = serve(router).await;
        let error = client(&base_url).get_product("10").await.unwrap_err();
        assert!(matches!(error, ApiError::Decode { status: 200, .. }), "got {error:?}");
    }

    #[test]
    fn from_env_reads_base_url_and_token() {
        temp_env::with_vars(
            [(BASE_URL_ENV, Some("http://127.0.0.1:8080/")), (TOKEN_ENV, Some("token-123"))],
            || {
                let client = ProductClient::from_env().unwrap();
                assert_eq!(client.base_url(), "http://127.0.0.1:8080");
            },
        );
        temp_env::with_var(BASE_URL_ENV, Some("ftp://products.internal"), || {
            assert!(matches!(ProductClient::from_env(), Err(ApiError::InvalidBaseUrl { .. })));
        });
    }

    #[tokio::test]
    async fn empty_id_is_rejected_before_sending() {
        let error = client("http://127.0.0.1:9").get_product(" ").await.unwrap_err();
        assert!(matches!(error, ApiError::EmptyProductId));
    }
}
