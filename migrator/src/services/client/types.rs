use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Remote collections that support list/count/create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Apps,
    Followers,
    Followings,
    Groups,
    Posts,
}

impl Collection {
    /// Path segment of the collection on the remote server
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Apps => "apps",
            Collection::Followers => "followers",
            Collection::Followings => "followings",
            Collection::Groups => "groups",
            Collection::Posts => "posts",
        }
    }
}

/// Pagination parameters accepted by list operations
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<bool>,
}

/// How a response status is interpreted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Item missing; benign
    NotFound,
    /// Item already present; benign
    Conflict,
    /// Client-side fault other than not-found/conflict
    HardError,
    /// Any other non-success (redirects, server errors); treated as nothing to do
    Other,
}

impl ResponseClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => ResponseClass::Success,
            404 => ResponseClass::NotFound,
            409 => ResponseClass::Conflict,
            400..=499 => ResponseClass::HardError,
            _ => ResponseClass::Other,
        }
    }
}

/// Status and decoded body of one remote call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn class(&self) -> ResponseClass {
        ResponseClass::from_status(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.class() == ResponseClass::Success
    }
}

/// MAC authorization secret issued by a delegated authorization
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthSecret {
    pub mac_key_id: String,
    pub mac_key: String,
    pub mac_algorithm: String,
}

impl fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSecret")
            .field("mac_key_id", &self.mac_key_id)
            .field("mac_key", &"<redacted>")
            .field("mac_algorithm", &self.mac_algorithm)
            .finish()
    }
}

/// Everything needed to talk to one side of a migration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialDescriptor {
    pub entity: String,
    pub servers: Vec<String>,
    pub auth: AuthSecret,
}

/// Output of the delegated-authorization handshake for one side
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthorizationResult {
    pub entity: String,
    pub servers: Vec<String>,
    pub credentials: AuthSecret,
}

impl AuthorizationResult {
    pub fn into_descriptor(self) -> CredentialDescriptor {
        CredentialDescriptor {
            entity: self.entity,
            servers: self.servers,
            auth: self.credentials,
        }
    }
}
