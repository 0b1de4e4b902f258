//! Change events pushed by the backend and the topics they arrive on.
//!
//! Topics follow `/topic/{updates|creates|deletes}/{entity}`. Create and
//! update payloads are the JSON-encoded entity; delete payloads are the bare
//! numeric id.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::models::{EntityId, EntityKind};

const TOPIC_PREFIX: &str = "/topic/";

/// Kind of change announced on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Topic segment for this change kind.
    pub fn segment(&self) -> &'static str {
        match self {
            ChangeKind::Created => "creates",
            ChangeKind::Updated => "updates",
            ChangeKind::Deleted => "deletes",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "creates" => Some(ChangeKind::Created),
            "updates" => Some(ChangeKind::Updated),
            "deletes" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

/// A push channel destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub change: ChangeKind,
    pub entity: EntityKind,
}

impl Topic {
    pub fn new(change: ChangeKind, entity: EntityKind) -> Self {
        Self { change, entity }
    }

    /// Topics the backend actually publishes for an entity kind.
    pub fn published_for(entity: EntityKind) -> Vec<Topic> {
        let changes: &[ChangeKind] = match entity {
            EntityKind::Flat | EntityKind::House => {
                &[ChangeKind::Updated, ChangeKind::Created, ChangeKind::Deleted]
            }
            EntityKind::UploadHistory => &[ChangeKind::Created],
            EntityKind::ApprovalRequest => &[ChangeKind::Updated, ChangeKind::Created],
        };
        changes.iter().map(|c| Topic::new(*c, entity)).collect()
    }

    /// STOMP destination string.
    pub fn destination(&self) -> String {
        format!(
            "{}{}/{}",
            TOPIC_PREFIX,
            self.change.segment(),
            self.entity.topic_name()
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(TOPIC_PREFIX)
            .ok_or_else(|| Error::Decode(format!("Not a topic destination: {}", s)))?;
        let (segment, entity) = rest
            .split_once('/')
            .ok_or_else(|| Error::Decode(format!("Malformed topic: {}", s)))?;
        let change = ChangeKind::from_segment(segment)
            .ok_or_else(|| Error::Decode(format!("Unknown change kind in topic: {}", s)))?;
        let entity = EntityKind::ALL
            .into_iter()
            .find(|k| k.topic_name() == entity)
            .ok_or_else(|| Error::Decode(format!("Unknown entity in topic: {}", s)))?;
        Ok(Topic { change, entity })
    }
}

/// Server-side change notification for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Created(T),
    Updated(T),
    Deleted(EntityId),
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Created(_) => ChangeKind::Created,
            ChangeEvent::Updated(_) => ChangeKind::Updated,
            ChangeEvent::Deleted(_) => ChangeKind::Deleted,
        }
    }
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    /// Decode a message body received on a topic of the given change kind.
    pub fn decode(change: ChangeKind, body: &str) -> Result<Self> {
        let decode_err =
            |e: serde_json::Error| Error::Decode(format!("{} payload: {}", change.segment(), e));
        match change {
            ChangeKind::Created => serde_json::from_str(body)
                .map(ChangeEvent::Created)
                .map_err(decode_err),
            ChangeKind::Updated => serde_json::from_str(body)
                .map(ChangeEvent::Updated)
                .map_err(decode_err),
            ChangeKind::Deleted => serde_json::from_str::<EntityId>(body.trim())
                .map(ChangeEvent::Deleted)
                .map_err(decode_err),
        }
    }
}
