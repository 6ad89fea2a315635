//! Remote identity server API consumed by the migration pipeline
//!
//! Every operation returns the raw status and body; interpreting the status
//! (success, benign, hard error) is the caller's job.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::errors::ClientResult;
use super::types::{ApiResponse, Collection, CredentialDescriptor, ListParams};

#[async_trait]
pub trait IdentityServerApi: Send + Sync {
    /// List one page of a collection
    async fn list(&self, collection: Collection, params: &ListParams) -> ClientResult<ApiResponse>;

    /// Count the items of a collection
    async fn count(&self, collection: Collection) -> ClientResult<ApiResponse>;

    /// Create an item in a collection
    async fn create(&self, collection: Collection, body: &Value) -> ClientResult<ApiResponse>;

    /// Create a following; the followed entity is a routing parameter
    async fn create_following(&self, entity: &str, body: &Value) -> ClientResult<ApiResponse>;

    /// Create an authorization grant for an application
    async fn create_app_authorization(&self, app_id: &str, body: &Value)
        -> ClientResult<ApiResponse>;

    /// List one page of a post's version history
    async fn list_post_versions(&self, post_id: &str, params: &ListParams)
        -> ClientResult<ApiResponse>;

    /// Fetch the full profile (info type -> data)
    async fn get_profile(&self) -> ClientResult<ApiResponse>;

    /// Replace one profile info type
    async fn update_profile(&self, info_type: &str, data: &Value) -> ClientResult<ApiResponse>;
}

/// Builds an API handle for a credential descriptor
pub trait ClientFactory: Send + Sync {
    fn connect(&self, credentials: &CredentialDescriptor) -> ClientResult<Arc<dyn IdentityServerApi>>;
}
