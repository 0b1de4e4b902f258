//! HTTP client for the catalog backend's REST endpoints.

use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use estate_core::{
    ApprovalRequest, Entity, EntityId, EntityKind, Error, Flat, FlatDraft, House, HouseDraft,
    PageResult, Query, Result, Session, UploadRecord,
};

use crate::config::{self, ClientConfig};

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

/// Backend answer to a JSON file import.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UploadReceipt {
    /// The import was written to the upload history.
    Recorded(UploadRecord),
    /// Plain acknowledgement.
    Message { message: String },
}

/// Authenticated client for the catalog backend.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    config: ClientConfig,
    session: Session,
}

impl RestClient {
    /// Create a client with the given configuration and session.
    pub fn new(config: ClientConfig, session: Session) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "rest",
            base_url = %config.base_url,
            authenticated = session.is_authenticated(),
            "Initializing REST client"
        );

        Ok(Self {
            client,
            config,
            session,
        })
    }

    /// Create from environment variables (see [`config`](crate::config)).
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env(), config::session_from_env())
    }

    /// Same connection, different session (after login or logout).
    pub fn with_session(&self, session: Session) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            session,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn url(&self, kind: EntityKind, path: &str) -> String {
        self.endpoint(&format!("{}{}", kind.rest_base(), path))
    }

    /// Build a request with the session's bearer token, if any.
    fn request(&self, method: Method, kind: EntityKind, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(kind, path));
        match self.session.token() {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Send and map transport failures and non-2xx statuses to typed errors.
    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.is_empty())
            .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        warn!(subsystem = "rest", status = status.as_u16(), error = %message, "Backend rejected request");
        Err(Error::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<R: DeserializeOwned>(&self, req: RequestBuilder) -> Result<R> {
        let response = self.send(req).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| Error::Decode(format!("Unexpected response body: {}", e)))
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Exchange credentials for a token. The returned session is not
    /// installed; pass it to [`with_session`](Self::with_session).
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        self.authenticate("sign-in", username, password).await
    }

    /// Register a new account and return its session.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<Session> {
        self.authenticate("sign-up", username, password).await
    }

    async fn authenticate(&self, op: &'static str, username: &str, password: &str) -> Result<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "Username and password are required".to_string(),
            ));
        }

        let req = self
            .client
            .post(self.endpoint(&format!("/auth/{}", op)))
            .json(&Credentials { username, password });
        let body: TokenBody = self.send_json(req).await?;

        info!(subsystem = "rest", op, login = %username, "Authenticated");
        Ok(Session::authenticated(body.token, username))
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Fetch one page of `T`'s collection.
    ///
    /// Uses the filtered endpoint when any filter has a value, the plain
    /// listing otherwise.
    pub async fn fetch_page<T: Entity>(&self, query: &Query) -> Result<PageResult<T>> {
        let kind = T::KIND;
        query.validate(kind)?;

        let params = [
            ("page", query.page.to_string()),
            ("size", query.page_size.to_string()),
            ("sort", query.sort_param()),
        ];

        let req = match kind.filter_path() {
            Some(path) if query.has_active_filters() => self
                .request(Method::POST, kind, path)
                .query(&params)
                .json(&query.filter_params()),
            _ => self
                .request(Method::GET, kind, kind.list_path())
                .query(&params),
        };

        let start = Instant::now();
        debug!(
            subsystem = "rest",
            op = "fetch",
            entity = %kind,
            page = query.page,
            page_size = query.page_size,
            sort = %query.sort_param(),
            filters = query.filters.len(),
            "Fetching page"
        );

        let page: PageResult<T> = self.send_json(req).await?;
        let page = page.normalized(query);

        debug!(
            subsystem = "rest",
            op = "fetch",
            entity = %kind,
            result_count = page.items.len(),
            total_pages = page.total_pages,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(page)
    }

    /// Fetch one record by id.
    pub async fn get<T: Entity>(&self, id: EntityId) -> Result<T> {
        let kind = T::KIND;
        self.send_json(self.request(Method::GET, kind, &kind.get_path(id)))
            .await
    }

    /// Create a record from a draft payload.
    pub async fn create<T: Entity, D: Serialize + ?Sized>(&self, draft: &D) -> Result<T> {
        let kind = T::KIND;
        debug!(subsystem = "rest", op = "create", entity = %kind, "Creating record");
        self.send_json(self.request(Method::POST, kind, "/create").json(draft))
            .await
    }

    /// Replace a record's attributes.
    pub async fn update<T: Entity, D: Serialize + ?Sized>(&self, id: EntityId, draft: &D) -> Result<T> {
        let kind = T::KIND;
        debug!(subsystem = "rest", op = "update", entity = %kind, entity_id = id, "Updating record");
        self.send_json(
            self.request(Method::PUT, kind, &format!("/update/{}", id))
                .json(draft),
        )
        .await
    }

    /// Delete a record. The response body is ignored.
    pub async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<()> {
        debug!(subsystem = "rest", op = "delete", entity = %kind, entity_id = id, "Deleting record");
        self.send(self.request(Method::DELETE, kind, &format!("/delete/{}", id)))
            .await?;
        Ok(())
    }

    pub async fn create_flat(&self, draft: &FlatDraft) -> Result<Flat> {
        draft.validate()?;
        self.create(draft).await
    }

    pub async fn update_flat(&self, id: EntityId, draft: &FlatDraft) -> Result<Flat> {
        draft.validate()?;
        self.update(id, draft).await
    }

    pub async fn create_house(&self, draft: &HouseDraft) -> Result<House> {
        draft.validate()?;
        self.create(draft).await
    }

    pub async fn update_house(&self, id: EntityId, draft: &HouseDraft) -> Result<House> {
        draft.validate()?;
        self.update(id, draft).await
    }

    /// Every flat in one house.
    pub async fn house_flats(&self, house_id: EntityId) -> Result<Vec<Flat>> {
        self.send_json(self.request(
            Method::GET,
            EntityKind::House,
            &format!("/get-all-flats/{}", house_id),
        ))
        .await
    }

    // =========================================================================
    // File import
    // =========================================================================

    /// Bulk-import flats or houses from a JSON file.
    pub async fn upload_json(
        &self,
        kind: EntityKind,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadReceipt> {
        if !matches!(kind, EntityKind::Flat | EntityKind::House) {
            return Err(Error::InvalidInput(format!(
                "{} records cannot be imported from a file",
                kind.label()
            )));
        }
        if contents.is_empty() {
            return Err(Error::InvalidInput(format!("{} is empty", file_name)));
        }

        let size = contents.len();
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/json")
            .map_err(|e| Error::InvalidInput(format!("Failed to create multipart: {}", e)))?;
        let form = Form::new().part("file", part);

        debug!(subsystem = "rest", op = "upload", entity = %kind, file = %file_name, bytes = size, "Uploading file");
        self.send_json(
            self.request(Method::POST, kind, "/upload/json")
                .multipart(form),
        )
        .await
    }

    /// Download the stored file of a house import.
    pub async fn download_upload(&self, file_id: EntityId) -> Result<Vec<u8>> {
        let response = self
            .send(self.request(
                Method::GET,
                EntityKind::House,
                &format!("/download/{}", file_id),
            ))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }

    // =========================================================================
    // Flat analytics
    // =========================================================================

    pub async fn flat_with_min_bathrooms(&self) -> Result<Flat> {
        self.flat_report("/get-flat-with-min-number-of-bathrooms")
            .await
    }

    pub async fn flat_with_max_coordinates(&self) -> Result<Flat> {
        self.flat_report("/get-flat-with-max-coordinates").await
    }

    /// Flats whose name starts with `prefix`.
    pub async fn flats_by_name_prefix(&self, prefix: &str) -> Result<Vec<Flat>> {
        self.send_json(
            self.request(Method::GET, EntityKind::Flat, "/get-flats-by-substring-of-name")
                .query(&[("prefix", prefix)]),
        )
        .await
    }

    /// All flats, closest to the metro on foot first.
    pub async fn flats_by_metro_time(&self) -> Result<Vec<Flat>> {
        self.flat_report("/get-flats-ordered-by-time-to-metro-on-foot")
            .await
    }

    /// The cheaper of two flats.
    pub async fn cheaper_flat(&self, first: EntityId, second: EntityId) -> Result<Flat> {
        self.send_json(
            self.request(Method::GET, EntityKind::Flat, "/choose-more-cheaper-flat-by-ids")
                .query(&[("id1", first), ("id2", second)]),
        )
        .await
    }

    async fn flat_report<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        debug!(subsystem = "rest", op = path.trim_start_matches('/'), "Running flat report");
        self.send_json(self.request(Method::GET, EntityKind::Flat, path))
            .await
    }

    // =========================================================================
    // Admin approval workflow
    // =========================================================================

    /// Ask for the admin role on behalf of the session's user.
    pub async fn create_approval_request(&self) -> Result<()> {
        self.send(self.request(
            Method::GET,
            EntityKind::ApprovalRequest,
            "/create-request",
        ))
        .await?;
        Ok(())
    }

    /// Grant a pending request (admin only, enforced by the backend).
    pub async fn approve_request(&self, id: EntityId) -> Result<()> {
        self.review_request("/approve-request", id).await
    }

    /// Reject a pending request (admin only, enforced by the backend).
    pub async fn reject_request(&self, id: EntityId) -> Result<()> {
        self.review_request("/reject-request", id).await
    }

    async fn review_request(&self, path: &str, id: EntityId) -> Result<()> {
        debug!(subsystem = "rest", op = path.trim_start_matches('/'), entity_id = id, "Reviewing approval request");
        self.send(
            self.request(Method::GET, EntityKind::ApprovalRequest, path)
                .query(&[("requestId", id)]),
        )
        .await?;
        Ok(())
    }

    /// Requests filed by the session's user.
    pub async fn my_approval_requests(&self) -> Result<Vec<ApprovalRequest>> {
        self.send_json(self.request(
            Method::GET,
            EntityKind::ApprovalRequest,
            "/get-my-requests",
        ))
        .await
    }

    pub async fn approval_request(&self, id: EntityId) -> Result<ApprovalRequest> {
        self.get(id).await
    }
}
