//! Alias scope and lambda parameter bindings
//!
//! Two lookup structures live here:
//!
//! - [`AliasScope`]: entity type (+ optional cast target) -> table alias, one
//!   frame per statement being compiled, with lookup falling through to the
//!   enclosing statements. Used for parameters no lambda bound explicitly.
//! - [`Env`]: persistent parameter-name -> [`Target`] bindings. A lambda body is
//!   always rendered against the `Env` that was current when its operator was
//!   compiled, so a projection referenced three operators later still resolves
//!   to the right table.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::expression::Expr;
use crate::metadata::{ColumnInfo, MetadataError, TableInfo};

/// Hands out `t`, `t1`, `t2`, ... for one translation.
#[derive(Debug, Default)]
pub struct AliasGenerator {
    issued: usize,
}

impl AliasGenerator {
    pub fn next_alias(&mut self) -> String {
        let n = self.issued;
        self.issued += 1;
        if n == 0 {
            "t".to_string()
        } else {
            format!("t{}", n)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasKey {
    pub entity: String,
    pub cast: Option<String>,
}

impl AliasKey {
    pub fn entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            cast: None,
        }
    }
}

#[derive(Debug)]
pub struct AliasScope {
    frames: Vec<HashMap<AliasKey, String>>,
}

impl Default for AliasScope {
    fn default() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }
}

impl AliasScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the frame of a nested statement.
    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// First registration of a key in the innermost frame wins.
    pub fn register(&mut self, key: AliasKey, alias: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.entry(key).or_insert_with(|| alias.to_string());
        }
    }

    pub fn lookup(&self, key: &AliasKey) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(key).map(String::as_str))
    }
}

/// A table reference in `FROM`/`JOIN`.
#[derive(Debug, Clone)]
pub struct TableTarget {
    pub alias: String,
    pub info: Arc<TableInfo>,
    /// `Cast<T>`/`OfType<T>` narrowing: only members `T` also declares are visible.
    pub cast: Option<Arc<TableInfo>>,
    /// Set on the result-selector binding of an outer-joined table; member
    /// references through this binding fall back to the `DefaultIfEmpty` value.
    pub default: Option<Rc<DefaultSubstitution>>,
}

impl TableTarget {
    pub fn new(alias: impl Into<String>, info: Arc<TableInfo>) -> Self {
        Self {
            alias: alias.into(),
            info,
            cast: None,
            default: None,
        }
    }

    pub fn with_default(self, default: Rc<DefaultSubstitution>) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub fn key(&self) -> AliasKey {
        AliasKey {
            entity: self.info.entity.clone(),
            cast: self.cast.as_ref().map(|c| c.entity.clone()),
        }
    }

    pub fn visible_columns(&self) -> Vec<&ColumnInfo> {
        self.info
            .columns()
            .iter()
            .filter(|c| self.cast.as_ref().is_none_or(|cast| cast.has_member(&c.member)))
            .collect()
    }

    pub fn column(&self, member: &str) -> Result<&ColumnInfo, MetadataError> {
        if let Some(cast) = &self.cast {
            if !cast.has_member(member) {
                return Err(MetadataError::UnknownMember {
                    entity: cast.entity.clone(),
                    member: member.to_string(),
                });
            }
        }
        self.info.require_column(member)
    }
}

/// The element of a grouped sequence.
#[derive(Debug)]
pub struct GroupTarget {
    pub key: Rc<Expr>,
    pub key_env: Env,
    /// What the grouped rows are, for aggregates over the group.
    pub element: Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    /// Member path the column stands for (`Name`, `Customer_Name`)
    pub member: String,
    /// Output column name of the inner select
    pub name: String,
}

/// A sealed `SELECT` wrapped as `(...) alias`.
#[derive(Debug)]
pub struct DerivedTarget {
    pub alias: String,
    pub columns: Vec<DerivedColumn>,
    /// Output name when the inner select projects a single scalar
    pub scalar: Option<String>,
}

impl DerivedTarget {
    pub fn column(&self, member: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.member == member)
            .map(|c| c.name.as_str())
    }

    /// Columns whose member path starts with `prefix_`.
    pub fn nested(&self, prefix: &str) -> Vec<DerivedColumn> {
        let head = format!("{}_", prefix);
        self.columns
            .iter()
            .filter_map(|c| {
                c.member.strip_prefix(&head).map(|rest| DerivedColumn {
                    member: rest.to_string(),
                    name: c.name.clone(),
                })
            })
            .collect()
    }
}

/// What a lambda parameter stands for.
#[derive(Debug, Clone)]
pub enum Target {
    Table(Rc<TableTarget>),
    /// Substitution: the parameter means `expr` rendered in `env`.
    Bound { expr: Rc<Expr>, env: Env },
    Group(Rc<GroupTarget>),
    Derived(Rc<DerivedTarget>),
}

impl Target {
    pub fn table(target: TableTarget) -> Self {
        Target::Table(Rc::new(target))
    }

    pub fn bound(expr: &Expr, env: &Env) -> Self {
        Target::Bound {
            expr: Rc::new(expr.clone()),
            env: env.clone(),
        }
    }
}

#[derive(Debug)]
struct Binding {
    name: String,
    target: Target,
    next: Env,
}

/// Persistent (structurally shared) parameter bindings.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<Binding>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: &str, target: Target) -> Env {
        Env {
            head: Some(Rc::new(Binding {
                name: name.to_string(),
                target,
                next: self.clone(),
            })),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Target> {
        let mut current = self.head.as_ref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.target);
            }
            current = binding.next.head.as_ref();
        }
        None
    }
}

/// `DefaultIfEmpty(fallback)` bookkeeping for one outer-joined parameter.
#[derive(Debug)]
pub struct DefaultSubstitution {
    /// Qualified key columns of the joined table
    pub guard: Vec<String>,
    pub fallback: Rc<Expr>,
    pub fallback_env: Env,
}
