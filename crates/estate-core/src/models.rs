//! Domain models for the property catalog.
//!
//! Wire format is the backend's camelCase JSON. Every listed record carries
//! a unique integer id and a reference to the owning [`User`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::Entity;

/// Backend-assigned record identifier.
pub type EntityId = i64;

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// The entity collections exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Flat,
    House,
    UploadHistory,
    ApprovalRequest,
}

const FLAT_FILTER_COLUMNS: &[&str] = &[
    "id",
    "name",
    "area",
    "price",
    "numberOfRooms",
    "numberOfBathrooms",
    "view",
    "username",
];

const HOUSE_FILTER_COLUMNS: &[&str] = &["id", "name", "year", "username"];

const UPLOAD_HISTORY_FILTER_COLUMNS: &[&str] = &[
    "id",
    "fileName",
    "entityName",
    "uploaded",
    "uploadDate",
    "status",
    "errorMessage",
    "username",
];

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Flat,
        EntityKind::House,
        EntityKind::UploadHistory,
        EntityKind::ApprovalRequest,
    ];

    /// Name used in push topics (`/topic/updates/<name>`).
    pub fn topic_name(&self) -> &'static str {
        match self {
            EntityKind::Flat => "flat",
            EntityKind::House => "house",
            EntityKind::UploadHistory => "upload-file-history",
            EntityKind::ApprovalRequest => "admin-creation-request",
        }
    }

    /// REST resource prefix.
    pub fn rest_base(&self) -> &'static str {
        match self {
            EntityKind::Flat => "/flat",
            EntityKind::House => "/house",
            EntityKind::UploadHistory => "/upload-history",
            EntityKind::ApprovalRequest => "/admin-creation",
        }
    }

    /// Path (relative to [`rest_base`](Self::rest_base)) of the unfiltered page listing.
    pub fn list_path(&self) -> &'static str {
        match self {
            EntityKind::ApprovalRequest => "/get-all-requests",
            _ => "/get-all",
        }
    }

    /// Path of the filtered page listing, if the collection supports filters.
    pub fn filter_path(&self) -> Option<&'static str> {
        match self {
            EntityKind::ApprovalRequest => None,
            _ => Some("/get-by-filter"),
        }
    }

    /// Path of the single-record lookup.
    pub fn get_path(&self, id: EntityId) -> String {
        match self {
            EntityKind::ApprovalRequest => format!("/get-request/{}", id),
            _ => format!("/get/{}", id),
        }
    }

    /// Columns a filter may target, in the order the filter picker offers them.
    pub fn filter_columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Flat => FLAT_FILTER_COLUMNS,
            EntityKind::House => HOUSE_FILTER_COLUMNS,
            EntityKind::UploadHistory => UPLOAD_HISTORY_FILTER_COLUMNS,
            EntityKind::ApprovalRequest => &[],
        }
    }

    /// Human-readable singular label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Flat => "Flat",
            EntityKind::House => "House",
            EntityKind::UploadHistory => "Upload record",
            EntityKind::ApprovalRequest => "Approval request",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_name())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" | "flats" => Ok(EntityKind::Flat),
            "house" | "houses" => Ok(EntityKind::House),
            "upload-file-history" | "upload-history" | "uploads" => Ok(EntityKind::UploadHistory),
            "admin-creation-request" | "approval" | "approvals" => {
                Ok(EntityKind::ApprovalRequest)
            }
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {}", other))),
        }
    }
}

// =============================================================================
// USERS
// =============================================================================

/// Role granted to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_ADMIN", alias = "ADMIN")]
    Admin,
    #[serde(rename = "ROLE_USER", alias = "USER")]
    User,
}

impl Role {
    /// Role assumed when nothing better is known.
    pub fn least_privilege() -> Self {
        Role::User
    }

    /// Parse a role claim value, accepting both prefixed and bare names.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ROLE_ADMIN" | "ADMIN" => Some(Role::Admin),
            "ROLE_USER" | "USER" => Some(Role::User),
            _ => None,
        }
    }
}

/// Account owning catalog records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

// =============================================================================
// CATALOG RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i64,
    pub y: i64,
}

/// View from a flat's windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    Street,
    Bad,
    Normal,
    Terrible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct House {
    pub id: EntityId,
    pub name: String,
    pub year: Option<i64>,
    pub number_of_flats_on_floor: Option<i64>,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flat {
    pub id: EntityId,
    pub name: String,
    pub coordinates: Coordinates,
    #[serde(with = "crate::timestamp")]
    pub creation_date: DateTime<Utc>,
    pub area: f64,
    pub price: f64,
    #[serde(default)]
    pub balcony: Option<bool>,
    #[serde(default)]
    pub time_to_metro_on_foot: Option<i32>,
    #[serde(default)]
    pub number_of_rooms: Option<i32>,
    #[serde(default)]
    pub number_of_bathrooms: Option<i32>,
    #[serde(default)]
    pub time_to_metro_by_transport: Option<f64>,
    pub view: View,
    #[serde(default)]
    pub house: Option<House>,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Success,
    Failure,
}

/// One bulk file import attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: EntityId,
    pub file_name: String,
    pub entity_name: String,
    /// Number of records imported.
    pub uploaded: i64,
    #[serde(with = "crate::timestamp")]
    pub upload_date: DateTime<Utc>,
    pub status: UploadStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Sent,
    Approved,
    Rejected,
}

/// Request by a user to be granted the admin role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: EntityId,
    pub user: User,
    pub status: ApprovalStatus,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status_changed_by: Option<User>,
}

impl Entity for Flat {
    const KIND: EntityKind = EntityKind::Flat;

    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Option<&User> {
        Some(&self.user)
    }
}

impl Entity for House {
    const KIND: EntityKind = EntityKind::House;

    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Option<&User> {
        Some(&self.user)
    }
}

impl Entity for UploadRecord {
    const KIND: EntityKind = EntityKind::UploadHistory;

    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Option<&User> {
        Some(&self.user)
    }
}

impl Entity for ApprovalRequest {
    const KIND: EntityKind = EntityKind::ApprovalRequest;

    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Option<&User> {
        Some(&self.user)
    }
}

// =============================================================================
// WRITE DRAFTS
// =============================================================================

/// Payload for creating or updating a flat.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatDraft {
    pub name: String,
    pub coordinates: Coordinates,
    pub area: f64,
    pub price: f64,
    pub balcony: bool,
    pub time_to_metro_on_foot: i32,
    pub number_of_rooms: i32,
    pub number_of_bathrooms: i32,
    pub time_to_metro_by_transport: f64,
    pub view: View,
    pub house_id: Option<EntityId>,
}

/// Upper bound on rooms the backend accepts.
pub const MAX_ROOMS: i32 = 7;

impl FlatDraft {
    /// Check the draft against the backend's field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Name must not be empty".to_string()));
        }
        if self.area <= 0.0 {
            return Err(Error::InvalidInput("Area must be greater than 0".to_string()));
        }
        if self.price <= 0.0 {
            return Err(Error::InvalidInput("Price must be greater than 0".to_string()));
        }
        if self.time_to_metro_on_foot <= 0 {
            return Err(Error::InvalidInput(
                "Time to metro on foot must be greater than 0".to_string(),
            ));
        }
        if self.number_of_rooms <= 0 || self.number_of_rooms > MAX_ROOMS {
            return Err(Error::InvalidInput(format!(
                "Number of rooms must be between 1 and {}",
                MAX_ROOMS
            )));
        }
        if self.number_of_bathrooms <= 0 {
            return Err(Error::InvalidInput(
                "Number of bathrooms must be greater than 0".to_string(),
            ));
        }
        if self.time_to_metro_by_transport <= 0.0 {
            return Err(Error::InvalidInput(
                "Time to metro by transport must be greater than 0".to_string(),
            ));
        }
        if self.house_id.is_none() {
            return Err(Error::InvalidInput("House must be selected".to_string()));
        }
        Ok(())
    }
}

impl From<&Flat> for FlatDraft {
    fn from(flat: &Flat) -> Self {
        Self {
            name: flat.name.clone(),
            coordinates: flat.coordinates,
            area: flat.area,
            price: flat.price,
            balcony: flat.balcony.unwrap_or(false),
            time_to_metro_on_foot: flat.time_to_metro_on_foot.unwrap_or_default(),
            number_of_rooms: flat.number_of_rooms.unwrap_or_default(),
            number_of_bathrooms: flat.number_of_bathrooms.unwrap_or_default(),
            time_to_metro_by_transport: flat.time_to_metro_by_transport.unwrap_or_default(),
            view: flat.view,
            house_id: flat.house.as_ref().map(|h| h.id),
        }
    }
}

/// Payload for creating or updating a house.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseDraft {
    pub name: String,
    pub year: i64,
    pub number_of_flats_on_floor: i64,
}

impl HouseDraft {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Name must not be empty".to_string()));
        }
        if self.year <= 0 {
            return Err(Error::InvalidInput("Year must be greater than 0".to_string()));
        }
        if self.number_of_flats_on_floor <= 0 {
            return Err(Error::InvalidInput(
                "Number of flats on floor must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&House> for HouseDraft {
    fn from(house: &House) -> Self {
        Self {
            name: house.name.clone(),
            year: house.year.unwrap_or_default(),
            number_of_flats_on_floor: house.number_of_flats_on_floor.unwrap_or_default(),
        }
    }
}
