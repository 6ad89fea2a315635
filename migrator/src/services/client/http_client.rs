use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::api::{ClientFactory, IdentityServerApi};
use super::auth::{authorization_header, generate_nonce};
use super::errors::{ClientError, ClientResult};
use super::types::{ApiResponse, Collection, CredentialDescriptor, ListParams};
use crate::services::config::HttpConfig;

/// Media type spoken by identity servers
pub const MEDIA_TYPE: &str = "application/vnd.tent.v0+json";

/// Identity server client over HTTP with MAC-signed requests
#[derive(Clone)]
pub struct HttpIdentityClient {
    http_client: Client,
    credentials: CredentialDescriptor,
    servers: Vec<Url>,
}

impl HttpIdentityClient {
    /// Create a client for one side of a migration
    pub fn new(credentials: CredentialDescriptor, config: &HttpConfig) -> ClientResult<Self> {
        let servers = credentials
            .servers
            .iter()
            .map(|server| {
                Url::parse(server).map_err(|e| ClientError::InvalidUrl {
                    url: server.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<ClientResult<Vec<_>>>()?;

        if servers.is_empty() {
            return Err(ClientError::NoServers {
                entity: credentials.entity.clone(),
            });
        }

        let http_client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::NetworkError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            credentials,
            servers,
        })
    }

    /// Append path segments to a server base URL
    pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> ClientResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                url: base.to_string(),
                message: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a signed request, falling back to the next server on transport failure
    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<&ListParams>,
        body: Option<&Value>,
    ) -> ClientResult<ApiResponse> {
        let mut last_error = None;

        for base in &self.servers {
            let url = Self::endpoint(base, segments)?;

            let mut builder = self
                .http_client
                .request(method.clone(), url)
                .header(ACCEPT, MEDIA_TYPE);
            if let Some(params) = query {
                builder = builder.query(params);
            }
            if let Some(body) = body {
                builder = builder
                    .header(CONTENT_TYPE, MEDIA_TYPE)
                    .body(serde_json::to_vec(body)?);
            }

            let mut request = builder.build().map_err(|e| ClientError::NetworkError {
                message: format!("Failed to build request: {}", e),
            })?;

            let signature = authorization_header(
                &self.credentials.auth,
                method.as_str(),
                request.url(),
                chrono::Utc::now().timestamp(),
                &generate_nonce(),
            )?;
            let signature = HeaderValue::from_str(&signature).map_err(|e| ClientError::Signing {
                message: e.to_string(),
            })?;
            request.headers_mut().insert(AUTHORIZATION, signature);

            debug!("[HttpIdentityClient] {} {}", method, request.url());

            match self.http_client.execute(request).await {
                Ok(response) => return Self::decode(response).await,
                Err(e) => {
                    warn!(
                        "[HttpIdentityClient] Request to {} failed, trying next server: {}",
                        base, e
                    );
                    last_error = Some(ClientError::NetworkError {
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::NoServers {
            entity: self.credentials.entity.clone(),
        }))
    }

    async fn decode(response: Response) -> ClientResult<ApiResponse> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ClientError::NetworkError {
            message: format!("Failed to read response body: {}", e),
        })?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            // Error pages are not always JSON; keep them as text
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse::new(status, body))
    }
}

#[async_trait]
impl IdentityServerApi for HttpIdentityClient {
    #[instrument(skip(self), err)]
    async fn list(&self, collection: Collection, params: &ListParams) -> ClientResult<ApiResponse> {
        self.send(Method::GET, &[collection.path()], Some(params), None)
            .await
    }

    #[instrument(skip(self), err)]
    async fn count(&self, collection: Collection) -> ClientResult<ApiResponse> {
        self.send(Method::GET, &[collection.path(), "count"], None, None)
            .await
    }

    #[instrument(skip(self, body), err)]
    async fn create(&self, collection: Collection, body: &Value) -> ClientResult<ApiResponse> {
        self.send(Method::POST, &[collection.path()], None, Some(body))
            .await
    }

    #[instrument(skip(self, body), err)]
    async fn create_following(&self, entity: &str, body: &Value) -> ClientResult<ApiResponse> {
        let mut body = body.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert("entity".to_string(), Value::String(entity.to_string()));
        }
        self.send(
            Method::POST,
            &[Collection::Followings.path()],
            None,
            Some(&body),
        )
        .await
    }

    #[instrument(skip(self, body), err)]
    async fn create_app_authorization(
        &self,
        app_id: &str,
        body: &Value,
    ) -> ClientResult<ApiResponse> {
        self.send(
            Method::POST,
            &[Collection::Apps.path(), app_id, "authorizations"],
            None,
            Some(body),
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn list_post_versions(
        &self,
        post_id: &str,
        params: &ListParams,
    ) -> ClientResult<ApiResponse> {
        self.send(
            Method::GET,
            &[Collection::Posts.path(), post_id, "versions"],
            Some(params),
            None,
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn get_profile(&self) -> ClientResult<ApiResponse> {
        self.send(Method::GET, &["profile"], None, None).await
    }

    #[instrument(skip(self, data), err)]
    async fn update_profile(&self, info_type: &str, data: &Value) -> ClientResult<ApiResponse> {
        self.send(Method::PUT, &["profile", info_type], None, Some(data))
            .await
    }
}

/// Production factory: one HTTP client per credential descriptor
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    config: HttpConfig,
}

impl HttpClientFactory {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(
        &self,
        credentials: &CredentialDescriptor,
    ) -> ClientResult<Arc<dyn IdentityServerApi>> {
        let client = HttpIdentityClient::new(credentials.clone(), &self.config)?;
        Ok(Arc::new(client))
    }
}
