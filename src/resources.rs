//! Resource endpoints used by the platform screens
//!
//! Thin wrappers over the generic verbs. Payloads other than the user
//! profile stay opaque JSON.

use crate::http_client::{ApiClient, Transport};
use crate::types::{ApiResponse, UserProfile};
use serde_json::Value as JsonValue;

/// Collections exposed with uniform list/get/create/update/delete routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Courses,
    Tests,
    Files,
    LiveSessions,
    Subscriptions,
    Users,
}

impl Resource {
    pub fn base_path(&self) -> &'static str {
        match self {
            Self::Courses => "/courses",
            Self::Tests => "/tests",
            Self::Files => "/files",
            Self::LiveSessions => "/sessions",
            Self::Subscriptions => "/subscriptions",
            Self::Users => "/users",
        }
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.base_path(), urlencode_segment(id))
    }
}

/// Percent-encode a single path segment
fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

impl<T: Transport> ApiClient<T> {
    pub async fn current_user(&self) -> ApiResponse<UserProfile> {
        self.get("/auth/me").await
    }

    pub async fn update_profile(&self, changes: &JsonValue) -> ApiResponse<UserProfile> {
        self.patch("/users/me", changes).await
    }

    pub async fn dashboard_stats(&self) -> ApiResponse<JsonValue> {
        self.get("/dashboard/stats").await
    }

    pub async fn list(&self, resource: Resource) -> ApiResponse<JsonValue> {
        self.get(resource.base_path()).await
    }

    pub async fn fetch(&self, resource: Resource, id: &str) -> ApiResponse<JsonValue> {
        self.get(&resource.item_path(id)).await
    }

    pub async fn create(&self, resource: Resource, body: &JsonValue) -> ApiResponse<JsonValue> {
        self.post(resource.base_path(), body).await
    }

    pub async fn update(&self, resource: Resource, id: &str, body: &JsonValue) -> ApiResponse<JsonValue> {
        self.put(&resource.item_path(id), body).await
    }

    pub async fn remove(&self, resource: Resource, id: &str) -> ApiResponse<JsonValue> {
        self.delete(&resource.item_path(id)).await
    }

    /// Create a folder in the file manager
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> ApiResponse<JsonValue> {
        let body = serde_json::json!({ "name": name, "parentId": parent_id });
        self.post("/files/folders", &body).await
    }

    /// Register the current user for a live session
    pub async fn join_live_session(&self, id: &str) -> ApiResponse<JsonValue> {
        let path = format!("{}/join", Resource::LiveSessions.item_path(id));
        self.post(&path, &JsonValue::Null).await
    }
}
