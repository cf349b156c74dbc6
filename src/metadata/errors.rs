use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Entity '{0}' is not registered (describe it in the entity registry before querying)")]
    UnknownEntity(String),

    #[error("Member '{member}' of entity '{entity}' has no column mapping")]
    UnknownMember { entity: String, member: String },

    #[error("Member '{member}' of entity '{entity}' is read-only and cannot be written")]
    ReadOnlyMember { entity: String, member: String },

    #[error("Entity '{0}' has no primary key")]
    NoPrimaryKey(String),

    #[error("Invalid SQL identifier '{0}' in entity description")]
    InvalidIdentifier(String),

    #[error("Entity '{entity}' declares member '{member}' twice")]
    DuplicateMember { entity: String, member: String },
}
