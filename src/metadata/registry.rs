//! Entity descriptions and the registry turning them into [`TableInfo`]s.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use super::{ColumnInfo, MetadataError, MetadataSource, TableInfo, TokenGenerator};
use crate::expression::ScalarKind;

lazy_static::lazy_static! {
    // Identifiers are spliced into SQL text, so only plain (optionally dotted) names pass.
    static ref IDENTIFIER: Option<Regex> =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").ok();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub member: String,
    /// Column name; defaults to the member name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default)]
    pub kind: ScalarKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenGenerator>,
}

/// Declarative description of an entity, the stand-in for reflected attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    /// Table name; defaults to the entity name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            members: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    fn push(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    fn plain(member: &str, kind: ScalarKind) -> MemberDescriptor {
        MemberDescriptor {
            member: member.to_string(),
            column: None,
            kind,
            nullable: false,
            key: false,
            read_only: false,
            token: None,
        }
    }

    /// Member stored in a column of the same name.
    pub fn member(self, member: &str, kind: ScalarKind) -> Self {
        self.push(Self::plain(member, kind))
    }

    pub fn nullable(self, member: &str, kind: ScalarKind) -> Self {
        self.push(MemberDescriptor {
            nullable: true,
            ..Self::plain(member, kind)
        })
    }

    /// Member stored in a differently named column.
    pub fn column(self, member: &str, column: &str, kind: ScalarKind) -> Self {
        self.push(MemberDescriptor {
            column: Some(column.to_string()),
            ..Self::plain(member, kind)
        })
    }

    pub fn key(self, member: &str, kind: ScalarKind) -> Self {
        self.push(MemberDescriptor {
            key: true,
            ..Self::plain(member, kind)
        })
    }

    pub fn read_only(self, member: &str, kind: ScalarKind) -> Self {
        self.push(MemberDescriptor {
            read_only: true,
            ..Self::plain(member, kind)
        })
    }

    /// Marks an already declared member as generated by `generator`.
    pub fn token(mut self, member: &str, generator: TokenGenerator) -> Self {
        if let Some(existing) = self.members.iter_mut().find(|m| m.member == member) {
            existing.token = Some(generator);
        } else {
            log::warn!(
                "token generator for undeclared member '{}.{}' ignored",
                self.name,
                member
            );
        }
        self
    }

    /// Validates the description and builds its [`TableInfo`].
    pub fn build(&self) -> Result<TableInfo, MetadataError> {
        let table_name = self.table.clone().unwrap_or_else(|| self.name.clone());
        check_identifier(&table_name)?;

        let mut columns = Vec::with_capacity(self.members.len());
        let mut seen = HashSet::new();
        let mut primary_keys = Vec::new();
        let mut read_only = HashSet::new();
        let mut token_columns = BTreeMap::new();

        for m in &self.members {
            if !seen.insert(m.member.as_str()) {
                return Err(MetadataError::DuplicateMember {
                    entity: self.name.clone(),
                    member: m.member.clone(),
                });
            }
            let column = m.column.clone().unwrap_or_else(|| m.member.clone());
            check_identifier(&m.member)?;
            check_identifier(&column)?;

            if m.key {
                primary_keys.push(m.member.clone());
            }
            if m.read_only {
                read_only.insert(m.member.clone());
            }
            if let Some(generator) = &m.token {
                token_columns.insert(m.member.clone(), generator.clone());
            }
            columns.push(ColumnInfo {
                member: m.member.clone(),
                column,
                kind: m.kind,
                nullable: m.nullable,
            });
        }

        Ok(TableInfo::new(
            self.name.clone(),
            table_name,
            columns,
            primary_keys,
            read_only,
            token_columns,
        ))
    }
}

fn check_identifier(name: &str) -> Result<(), MetadataError> {
    if IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier(name.to_string()))
    }
}

/// In-process catalogue of entity descriptions.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    descriptors: RwLock<HashMap<String, EntityDescriptor>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, descriptor: EntityDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Registers (or replaces) a description. Already cached metadata is not
    /// invalidated; register everything before the first translation.
    pub fn register(&self, descriptor: EntityDescriptor) {
        let mut guard = match self.descriptors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(descriptor.name.clone(), descriptor);
    }

    pub fn contains(&self, entity: &str) -> bool {
        match self.descriptors.read() {
            Ok(guard) => guard.contains_key(entity),
            Err(poisoned) => poisoned.into_inner().contains_key(entity),
        }
    }
}

impl MetadataSource for EntityRegistry {
    fn load(&self, entity: &str) -> Result<TableInfo, MetadataError> {
        let guard = match self.descriptors.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let descriptor = guard
            .get(entity)
            .ok_or_else(|| MetadataError::UnknownEntity(entity.to_string()))?;
        log::debug!("resolving metadata for entity '{}'", entity);
        descriptor.build()
    }
}
