//! Entity metadata
//!
//! Maps an entity name to its table, ordered column map, primary keys,
//! read-only members and token (generated) members. Entities are described with
//! [`EntityDescriptor`] and turned into immutable [`TableInfo`]s by
//! [`EntityRegistry`]; [`CachedResolver`] memoizes the result so every entity is
//! resolved at most once.

mod cache;
mod errors;
mod registry;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::expression::ScalarKind;

pub use cache::{CachedResolver, TableInfoCache};
pub use errors::MetadataError;
pub use registry::{EntityDescriptor, EntityRegistry, MemberDescriptor};

/// How a token column gets its value when a row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenGenerator {
    /// Database identity / autoincrement
    Identity,
    Guid,
    Timestamp,
    /// Named database sequence
    Sequence(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub member: String,
    pub column: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

/// Resolved metadata of one entity. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub entity: String,
    pub table_name: String,
    columns: Vec<ColumnInfo>,
    primary_keys: Vec<String>,
    read_only: HashSet<String>,
    token_columns: BTreeMap<String, TokenGenerator>,
}

impl TableInfo {
    pub fn new(
        entity: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnInfo>,
        primary_keys: Vec<String>,
        read_only: HashSet<String>,
        token_columns: BTreeMap<String, TokenGenerator>,
    ) -> Self {
        Self {
            entity: entity.into(),
            table_name: table_name.into(),
            columns,
            primary_keys,
            read_only,
            token_columns,
        }
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, member: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.member == member)
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.column(member).is_some()
    }

    /// Like [`TableInfo::column`], failing for an unmapped member.
    pub fn require_column(&self, member: &str) -> Result<&ColumnInfo, MetadataError> {
        self.column(member).ok_or_else(|| MetadataError::UnknownMember {
            entity: self.entity.clone(),
            member: member.to_string(),
        })
    }

    /// Primary key members, in declaration order.
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn key_columns(&self) -> Result<Vec<&ColumnInfo>, MetadataError> {
        if self.primary_keys.is_empty() {
            return Err(MetadataError::NoPrimaryKey(self.entity.clone()));
        }
        self.primary_keys
            .iter()
            .map(|key| {
                self.column(key).ok_or_else(|| MetadataError::UnknownMember {
                    entity: self.entity.clone(),
                    member: key.clone(),
                })
            })
            .collect()
    }

    pub fn is_read_only(&self, member: &str) -> bool {
        self.read_only.contains(member)
    }

    pub fn token_columns(&self) -> &BTreeMap<String, TokenGenerator> {
        &self.token_columns
    }

    /// Column for a member the write path wants to assign.
    pub fn column_for_write(&self, member: &str) -> Result<&ColumnInfo, MetadataError> {
        let column = self.require_column(member)?;
        if self.is_read_only(member) || self.token_columns.contains_key(member) {
            return Err(MetadataError::ReadOnlyMember {
                entity: self.entity.clone(),
                member: member.to_string(),
            });
        }
        Ok(column)
    }

    /// Columns an insert or update may assign.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(move |c| {
            !self.read_only.contains(&c.member) && !self.token_columns.contains_key(&c.member)
        })
    }
}

/// Resolves an entity name to its metadata.
///
/// Implementations must be safe to share between threads translating
/// different queries at the same time.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, entity: &str) -> Result<Arc<TableInfo>, MetadataError>;
}

/// Produces metadata for an entity. Wrapped by [`CachedResolver`].
#[cfg_attr(test, mockall::automock)]
pub trait MetadataSource: Send + Sync {
    fn load(&self, entity: &str) -> Result<TableInfo, MetadataError>;
}
