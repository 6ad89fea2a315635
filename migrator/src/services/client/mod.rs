// Remote identity server access for the migration pipeline
//
// This module provides:
// - The API trait the resource migrators are written against
// - Status classification shared by every stage
// - MAC request signing
// - The reqwest-backed transport and its factory

pub mod api;
pub mod auth;
pub mod errors;
pub mod http_client;
pub mod types;

pub use api::{ClientFactory, IdentityServerApi};
pub use errors::{ClientError, ClientResult};
pub use http_client::{HttpClientFactory, HttpIdentityClient, MEDIA_TYPE};
pub use types::{
    ApiResponse, AuthSecret, AuthorizationResult, Collection, CredentialDescriptor, ListParams,
    ResponseClass,
};
