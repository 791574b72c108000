//! Directory entity types and the capability trait the typed cache is
//! generic over.
//!
//! The reference implementation reaches for runtime reflection to read
//! `SAMAccountName` generically across entity variants; here each entity
//! simply implements [`DirectoryEntity`], so the generic cache never needs
//! to introspect a type it doesn't know about.

use serde::{Deserialize, Serialize};

/// Capability every cacheable directory object satisfies.
pub trait DirectoryEntity: Clone + Send + Sync + 'static {
    /// Distinguished Name. Primary identity; unique within one entity type.
    fn dn(&self) -> &str;

    /// Short login handle. `None` (or empty) entities are not indexed by it.
    fn sam_account_name(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub dn: String,
    pub sam_account_name: String,
    pub enabled: bool,
    pub groups: Vec<String>,
}

impl DirectoryEntity for User {
    fn dn(&self) -> &str {
        &self.dn
    }

    fn sam_account_name(&self) -> Option<&str> {
        non_empty(&self.sam_account_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub dn: String,
    pub members: Vec<String>,
}

impl DirectoryEntity for Group {
    fn dn(&self) -> &str {
        &self.dn
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Computer {
    pub dn: String,
    pub sam_account_name: String,
    pub enabled: bool,
    pub groups: Vec<String>,
}

impl DirectoryEntity for Computer {
    fn dn(&self) -> &str {
        &self.dn
    }

    fn sam_account_name(&self) -> Option<&str> {
        non_empty(&self.sam_account_name)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// A Group enriched with full User records for each member DN — a
/// materialized join produced on demand, never stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupWithMembers {
    pub group: Group,
    pub members: Vec<User>,
}

/// A User enriched with full Group records for each membership DN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserWithGroups {
    pub user: User,
    pub groups: Vec<Group>,
}

/// A Computer enriched with full Group records for each membership DN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputerWithGroups {
    pub computer: Computer,
    pub groups: Vec<Group>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sam_account_name_is_not_indexable() {
        let u = User {
            dn: "cn=alice,dc=example,dc=com".into(),
            sam_account_name: String::new(),
            ..Default::default()
        };
        assert_eq!(u.sam_account_name(), None);
    }

    #[test]
    fn non_empty_sam_account_name_is_indexable() {
        let u = User {
            dn: "cn=alice,dc=example,dc=com".into(),
            sam_account_name: "alice".into(),
            ..Default::default()
        };
        assert_eq!(u.sam_account_name(), Some("alice"));
    }

    #[test]
    fn group_has_no_sam_account_name() {
        let g = Group {
            dn: "cn=admins,dc=example,dc=com".into(),
            members: vec![],
        };
        assert_eq!(g.sam_account_name(), None);
    }
}
