use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

/// Category label stored until the classifier has produced one.
pub const NOT_SCANNED: &str = "not_scanned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Lost,
    Found,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lost => "lost",
            ItemType::Found => "found",
        }
    }

    /// The report type a match has to come from.
    pub fn opposite(&self) -> ItemType {
        match self {
            ItemType::Lost => ItemType::Found,
            ItemType::Found => ItemType::Lost,
        }
    }
}

impl FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lost" => Ok(ItemType::Lost),
            "found" => Ok(ItemType::Found),
            other => Err(AppError::InvalidInput(format!(
                "item_type must be 'lost' or 'found', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Recovered,
    Escalated,
    Verified,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Recovered => "recovered",
            ItemStatus::Escalated => "escalated",
            ItemStatus::Verified => "verified",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ItemStatus::Active),
            "recovered" => Ok(ItemStatus::Recovered),
            "escalated" => Ok(ItemStatus::Escalated),
            "verified" => Ok(ItemStatus::Verified),
            other => Err(AppError::InvalidInput(format!("unknown status '{}'", other))),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case reference issued by police verification. Both parts are set together, once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliceCase {
    pub case_id: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub college: String,
    pub contact: String,
    pub item_type: ItemType,
    pub reporter_email: String,
    pub image_url: Option<String>,
    pub ai_category: String,
    /// Argon2 PHC string; never the raw identifier.
    #[serde(skip_serializing)]
    pub identifier_hash: Option<String>,
    #[serde(skip_serializing)]
    pub identifier_token: Option<String>,
    pub status: ItemStatus,
    pub feedback: Option<String>,
    pub police_case: Option<PoliceCase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape as selected from the `items` table.
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub college: String,
    pub contact: String,
    pub item_type: String,
    pub reporter_email: String,
    pub image_url: Option<String>,
    pub ai_category: String,
    pub identifier_hash: Option<String>,
    pub identifier_token: Option<String>,
    pub status: String,
    pub feedback: Option<String>,
    pub police_case_id: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let police_case = match (row.police_case_id, row.verified_at) {
            (Some(case_id), Some(verified_at)) => Some(PoliceCase {
                case_id,
                verified_at,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Internal(format!(
                    "item {} has a partial police case",
                    row.id
                )))
            }
        };

        Ok(Item {
            id: row.id,
            name: row.name,
            description: row.description,
            location: row.location,
            college: row.college,
            contact: row.contact,
            item_type: row.item_type.parse().map_err(|_| {
                AppError::Internal(format!("item {} has invalid item_type", row.id))
            })?,
            reporter_email: row.reporter_email,
            image_url: row.image_url,
            ai_category: row.ai_category,
            identifier_hash: row.identifier_hash,
            identifier_token: row.identifier_token,
            status: row.status.parse().map_err(|_| {
                AppError::Internal(format!("item {} has invalid status", row.id))
            })?,
            feedback: row.feedback,
            police_case,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Everything a report submission persists; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub location: String,
    pub college: String,
    pub contact: String,
    pub item_type: ItemType,
    pub reporter_email: String,
    pub image_url: Option<String>,
    pub ai_category: String,
    pub identifier_hash: Option<String>,
    pub identifier_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    pub college: Option<String>,
    pub limit: i64,
}

/// Target of a conditional status update.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: ItemStatus,
    /// `None` keeps the stored feedback.
    pub feedback: Option<String>,
    pub police_case: Option<PoliceCase>,
}
