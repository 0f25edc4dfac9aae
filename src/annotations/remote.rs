//! Remote data source for annotation collections
//!
//! The server speaks JSON over REST, one resource per collection
//! (`bookmarks`, `highlights`, `notes`). Any non-success status is reported
//! as a uniform network failure.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{Annotation, Payload};
use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use crate::position::ChapterPosition;

/// Server-side operations for one annotation collection
#[async_trait]
pub trait RemoteSource<P: Payload>: Send + Sync {
    async fn list_all(&self, user_id: &str) -> Result<Vec<Annotation<P>>>;

    async fn list_for_chapter(
        &self,
        user_id: &str,
        chapter: ChapterPosition,
    ) -> Result<Vec<Annotation<P>>>;

    /// Create on the server; the returned entity carries the server id
    async fn create(&self, user_id: &str, annotation: &Annotation<P>) -> Result<Annotation<P>>;

    /// Push new payload for an entity the server already knows
    async fn update(&self, user_id: &str, annotation: &Annotation<P>) -> Result<Annotation<P>>;

    /// Delete by server id; deleting something already gone succeeds
    async fn delete(&self, user_id: &str, server_id: &str) -> Result<()>;
}

/// Annotation as the server returns it
#[derive(Debug, Deserialize)]
struct RemoteRecord<P> {
    id: String,
    #[serde(rename = "clientId", default)]
    client_id: Option<Uuid>,
    #[serde(rename = "bookId")]
    book_id: u32,
    #[serde(rename = "chapterNumber")]
    chapter_number: u32,
    #[serde(flatten)]
    payload: P,
    #[serde(rename = "createdAt", default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl<P> RemoteRecord<P> {
    fn into_annotation(self) -> Annotation<P> {
        Annotation {
            local_id: self.client_id.unwrap_or_else(Uuid::new_v4),
            server_id: Some(self.id),
            book_id: self.book_id,
            chapter_number: self.chapter_number,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a, P> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    /// Lets the server drop duplicate creates from replayed actions
    #[serde(rename = "clientId")]
    client_id: Uuid,
    #[serde(rename = "bookId")]
    book_id: u32,
    #[serde(rename = "chapterNumber")]
    chapter_number: u32,
    #[serde(flatten)]
    payload: &'a P,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a, P> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(flatten)]
    payload: &'a P,
}

/// reqwest-backed [`RemoteSource`]
pub struct HttpRemote<P> {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> HttpRemote<P> {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            _payload: PhantomData,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, P::ENTITY.resource())
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/{}", self.collection_url(), user_id)
    }

    fn item_url(&self, server_id: &str) -> String {
        format!("{}/{}", self.collection_url(), server_id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!(
                "{} returned {}: {}",
                P::ENTITY.resource(),
                status,
                body
            )));
        }

        Ok(response)
    }

    async fn fetch_list(&self, request: RequestBuilder) -> Result<Vec<Annotation<P>>> {
        let records: Vec<RemoteRecord<P>> = self.send(request).await?.json().await?;
        Ok(records.into_iter().map(RemoteRecord::into_annotation).collect())
    }
}

#[async_trait]
impl<P: Payload> RemoteSource<P> for HttpRemote<P> {
    async fn list_all(&self, user_id: &str) -> Result<Vec<Annotation<P>>> {
        tracing::debug!(entity_type = %P::ENTITY, "Fetching all remote annotations");
        self.fetch_list(self.client.get(self.user_url(user_id))).await
    }

    async fn list_for_chapter(
        &self,
        user_id: &str,
        chapter: ChapterPosition,
    ) -> Result<Vec<Annotation<P>>> {
        let request = self.client.get(self.user_url(user_id)).query(&[
            ("bookId", chapter.book_id),
            ("chapterNumber", chapter.chapter_number),
        ]);
        self.fetch_list(request).await
    }

    async fn create(&self, user_id: &str, annotation: &Annotation<P>) -> Result<Annotation<P>> {
        let body = CreateRequest {
            user_id,
            client_id: annotation.local_id,
            book_id: annotation.book_id,
            chapter_number: annotation.chapter_number,
            payload: &annotation.payload,
        };
        let record: RemoteRecord<P> = self
            .send(self.client.post(self.collection_url()).json(&body))
            .await?
            .json()
            .await?;

        let mut created = record.into_annotation();
        created.local_id = annotation.local_id;
        Ok(created)
    }

    async fn update(&self, user_id: &str, annotation: &Annotation<P>) -> Result<Annotation<P>> {
        let server_id = annotation.server_id.as_deref().ok_or_else(|| {
            SyncError::InvalidData(format!("{} has no server id", annotation.local_id))
        })?;
        let body = UpdateRequest {
            user_id,
            payload: &annotation.payload,
        };
        let record: RemoteRecord<P> = self
            .send(self.client.patch(self.item_url(server_id)).json(&body))
            .await?
            .json()
            .await?;

        let mut updated = record.into_annotation();
        updated.local_id = annotation.local_id;
        Ok(updated)
    }

    async fn delete(&self, _user_id: &str, server_id: &str) -> Result<()> {
        let request = self.authorized(self.client.delete(self.item_url(server_id)));
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(server_id, "Remote annotation already deleted");
                Ok(())
            }
            status => Err(SyncError::Network(format!(
                "{} delete returned {}",
                P::ENTITY.resource(),
                status
            ))),
        }
    }
}

#[cfg(test)]
pub use mock::MockRemote;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::types::{HighlightColor, HighlightPayload, NotePayload};

    fn remote<P: Payload>(base_url: &str) -> HttpRemote<P> {
        HttpRemote::new(&RemoteConfig {
            base_url: base_url.to_string(),
            token: Some("secret".to_string()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let highlights = remote::<HighlightPayload>("https://api.versemate.org/");
        assert_eq!(
            highlights.user_url("u1"),
            "https://api.versemate.org/highlights/u1"
        );
        assert_eq!(
            highlights.item_url("42"),
            "https://api.versemate.org/highlights/42"
        );

        let notes = remote::<NotePayload>("http://localhost:4000");
        assert_eq!(notes.collection_url(), "http://localhost:4000/notes");
    }

    #[test]
    fn test_record_parsing() {
        let client_id = Uuid::new_v4();
        let json = serde_json::json!({
            "id": "77",
            "clientId": client_id,
            "bookId": 43,
            "chapterNumber": 3,
            "startVerse": 16,
            "endVerse": 17,
            "color": "purple",
            "createdAt": "2024-01-01T00:00:00Z"
        });

        let record: RemoteRecord<HighlightPayload> = serde_json::from_value(json).unwrap();
        let highlight = record.into_annotation();
        assert_eq!(highlight.local_id, client_id);
        assert_eq!(highlight.server_id.as_deref(), Some("77"));
        assert_eq!(highlight.chapter(), ChapterPosition::new(43, 3));
        assert_eq!(highlight.payload.color, HighlightColor::Purple);
    }

    #[test]
    fn test_create_request_flattens_payload() {
        let payload = NotePayload {
            verse_number: None,
            content: "Selah".to_string(),
        };
        let body = CreateRequest {
            user_id: "u1",
            client_id: Uuid::nil(),
            book_id: 19,
            chapter_number: 3,
            payload: &payload,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "Selah");
        assert_eq!(json["clientId"], Uuid::nil().to_string());
        assert!(json.get("verseNumber").is_none());
    }
}
