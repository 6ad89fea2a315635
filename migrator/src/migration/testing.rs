//! In-memory identity server and helpers for pipeline tests

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::migration::context::{item_id, JobContext};
use crate::migration::progress::EventBus;
use crate::migration::rewriter::EntityRewriter;
use crate::services::client::{
    ApiResponse, AuthSecret, ClientError, ClientFactory, ClientResult, Collection,
    CredentialDescriptor, IdentityServerApi, ListParams,
};
use crate::services::config::PaginationConfig;
use crate::services::store::{JobStateStore, MemoryStore};

/// One write received by the fake server
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub operation: String,
    pub body: Value,
}

/// Identity server double: serves seeded collections and records writes
///
/// Creating an item whose id (and version, when present) was already created
/// on this server answers 409, so re-runs behave like a real server.
pub struct FakeServer {
    pub entity: String,
    collections: Mutex<HashMap<Collection, Vec<Value>>>,
    versions: Mutex<HashMap<String, Vec<Value>>>,
    profile: Mutex<Map<String, Value>>,
    created: Mutex<Vec<Created>>,
    seen: Mutex<HashSet<String>>,
    scripted: Mutex<HashMap<String, VecDeque<u16>>>,
    list_calls: Mutex<Vec<(Collection, ListParams)>>,
}

impl FakeServer {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            collections: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
            profile: Mutex::new(Map::new()),
            created: Mutex::new(Vec::new()),
            seen: Mutex::new(HashSet::new()),
            scripted: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed a collection; items are served in the given order
    pub fn seed(&self, collection: Collection, items: Vec<Value>) {
        self.collections.lock().unwrap().insert(collection, items);
    }

    pub fn seed_versions(&self, post_id: &str, versions: Vec<Value>) {
        self.versions
            .lock()
            .unwrap()
            .insert(post_id.to_string(), versions);
    }

    pub fn seed_profile(&self, info_type: &str, data: Value) {
        self.profile
            .lock()
            .unwrap()
            .insert(info_type.to_string(), data);
    }

    /// Answer the next calls of `operation` with these statuses, in order
    pub fn script(&self, operation: &str, statuses: &[u16]) {
        self.scripted
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    pub fn created(&self, operation: &str) -> Vec<Value> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.body.clone())
            .collect()
    }

    pub fn list_calls(&self, collection: Collection) -> Vec<ListParams> {
        self.list_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == collection)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn scripted_status(&self, operation: &str) -> Option<u16> {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
    }

    fn write(&self, operation: &str, body: &Value) -> ApiResponse {
        self.created.lock().unwrap().push(Created {
            operation: operation.to_string(),
            body: body.clone(),
        });

        if let Some(status) = self.scripted_status(operation) {
            return ApiResponse::new(status, json!({"scripted": status}));
        }

        let identity = match (item_id(body), body.get("version")) {
            (Some(id), Some(version)) => Some(format!("{}:{}@{}", operation, id, version)),
            (Some(id), None) => Some(format!("{}:{}", operation, id)),
            (None, _) => None,
        };
        let duplicate =
            identity.is_some_and(|identity| !self.seen.lock().unwrap().insert(identity));
        if duplicate {
            ApiResponse::new(409, json!({"error": "already exists"}))
        } else {
            ApiResponse::new(200, body.clone())
        }
    }
}

#[async_trait]
impl IdentityServerApi for FakeServer {
    async fn list(&self, collection: Collection, params: &ListParams) -> ClientResult<ApiResponse> {
        self.list_calls
            .lock()
            .unwrap()
            .push((collection, params.clone()));

        if let Some(status) = self.scripted_status(&format!("list:{}", collection.path())) {
            return Ok(ApiResponse::new(status, json!({"scripted": status})));
        }

        let collections = self.collections.lock().unwrap();
        let items = collections.get(&collection).cloned().unwrap_or_default();
        let cursor = params.before_id.as_ref().or(params.since_id.as_ref());
        let start = match cursor {
            Some(cursor) => items
                .iter()
                .position(|item| item_id(item).as_ref() == Some(cursor))
                .map(|index| index + 1)
                .unwrap_or(items.len()),
            None => 0,
        };
        let limit = params.limit.unwrap_or(50) as usize;
        let page: Vec<Value> = items.into_iter().skip(start).take(limit).collect();
        Ok(ApiResponse::new(200, Value::Array(page)))
    }

    async fn count(&self, collection: Collection) -> ClientResult<ApiResponse> {
        let collections = self.collections.lock().unwrap();
        let total = collections.get(&collection).map_or(0, Vec::len);
        Ok(ApiResponse::new(200, json!(total)))
    }

    async fn create(&self, collection: Collection, body: &Value) -> ClientResult<ApiResponse> {
        Ok(self.write(&format!("create:{}", collection.path()), body))
    }

    async fn create_following(&self, entity: &str, body: &Value) -> ClientResult<ApiResponse> {
        let mut body = body.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert("entity".to_string(), Value::String(entity.to_string()));
        }
        Ok(self.write("create:followings", &body))
    }

    async fn create_app_authorization(
        &self,
        app_id: &str,
        body: &Value,
    ) -> ClientResult<ApiResponse> {
        Ok(self.write(&format!("create:apps/{}/authorizations", app_id), body))
    }

    async fn list_post_versions(
        &self,
        post_id: &str,
        _params: &ListParams,
    ) -> ClientResult<ApiResponse> {
        if let Some(status) = self.scripted_status("list:versions") {
            return Ok(ApiResponse::new(status, json!({"scripted": status})));
        }
        match self.versions.lock().unwrap().get(post_id) {
            Some(versions) => Ok(ApiResponse::new(200, Value::Array(versions.clone()))),
            None => Ok(ApiResponse::new(404, json!({"error": "not found"}))),
        }
    }

    async fn get_profile(&self) -> ClientResult<ApiResponse> {
        let profile = self.profile.lock().unwrap().clone();
        Ok(ApiResponse::new(200, Value::Object(profile)))
    }

    async fn update_profile(&self, info_type: &str, data: &Value) -> ClientResult<ApiResponse> {
        let mut body = data.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert("id".to_string(), Value::String(info_type.to_string()));
        }
        let operation = "update:profile";
        self.created.lock().unwrap().push(Created {
            operation: operation.to_string(),
            body,
        });
        match self.scripted_status(operation) {
            Some(status) => Ok(ApiResponse::new(status, json!({"scripted": status}))),
            None => Ok(ApiResponse::new(200, data.clone())),
        }
    }
}

/// Hands out fake servers by entity
#[derive(Default)]
pub struct FakeFactory {
    servers: Mutex<HashMap<String, Arc<FakeServer>>>,
}

impl FakeFactory {
    pub fn with(servers: Vec<Arc<FakeServer>>) -> Self {
        let factory = Self::default();
        for server in servers {
            factory
                .servers
                .lock()
                .unwrap()
                .insert(server.entity.clone(), server);
        }
        factory
    }
}

impl ClientFactory for FakeFactory {
    fn connect(
        &self,
        credentials: &CredentialDescriptor,
    ) -> ClientResult<Arc<dyn IdentityServerApi>> {
        match self.servers.lock().unwrap().get(&credentials.entity) {
            Some(server) => Ok(server.clone() as Arc<dyn IdentityServerApi>),
            None => Err(ClientError::NoServers {
                entity: credentials.entity.clone(),
            }),
        }
    }
}

pub fn descriptor(entity: &str) -> CredentialDescriptor {
    CredentialDescriptor {
        entity: entity.to_string(),
        servers: vec![format!("{}/tent", entity)],
        auth: AuthSecret {
            mac_key_id: format!("{}-key", entity),
            mac_key: "secret".to_string(),
            mac_algorithm: "hmac-sha-256".to_string(),
        },
    }
}

/// A job context wired to two fake servers and a fresh memory store
pub fn context_with(
    export: Arc<FakeServer>,
    import: Arc<FakeServer>,
    page_size: u32,
) -> JobContext {
    let rewriter = EntityRewriter::new(export.entity.clone(), import.entity.clone());
    JobContext {
        job_key: "test-job".to_string(),
        export,
        import,
        rewriter,
        pagination: PaginationConfig {
            page_size,
            ..Default::default()
        },
        state: JobStateStore::new(Arc::new(MemoryStore::new())),
        events: EventBus::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_create_conflicts() {
        let server = FakeServer::new("https://a.example");
        let group = json!({"id": "g1"});

        let first = server.create(Collection::Groups, &group).await.unwrap();
        let second = server.create(Collection::Groups, &group).await.unwrap();
        let unidentified = server.create(Collection::Groups, &json!({})).await.unwrap();
        let again = server.create(Collection::Groups, &json!({})).await.unwrap();

        assert_eq!(first.status, 200);
        assert_eq!(second.status, 409);
        assert_eq!(unidentified.status, 200);
        assert_eq!(again.status, 200);
        assert_eq!(server.created("create:groups").len(), 4);
    }

    #[tokio::test]
    async fn test_versions_of_one_post_are_distinct() {
        let server = FakeServer::new("https://a.example");
        let v1 = json!({"id": "p1", "version": 1});
        let v2 = json!({"id": "p1", "version": 2});

        assert_eq!(server.create(Collection::Posts, &v1).await.unwrap().status, 200);
        assert_eq!(server.create(Collection::Posts, &v2).await.unwrap().status, 200);
        assert_eq!(server.create(Collection::Posts, &v1).await.unwrap().status, 409);
    }
}
