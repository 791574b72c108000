//! Bind identity owned exclusively by a [`PooledConnection`] (§3).

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A DN/secret pair a pooled connection is bound to. The empty pair
/// represents the anonymous/service-account identity and forms its own
/// reuse class — it only matches other anonymous requests.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    dn: String,
    secret: String,
}

impl Credentials {
    pub fn new(dn: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            secret: secret.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            dn: String::new(),
            secret: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.dn.is_empty() && self.secret.is_empty()
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Byte-for-byte equality on both fields, the reuse predicate's rule 4.
    pub fn matches(&self, other: &Credentials) -> bool {
        if self.is_anonymous() && other.is_anonymous() {
            return true;
        }
        self.dn == other.dn && self.secret == other.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("dn", &self.dn)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_matches_anonymous_only() {
        let a = Credentials::anonymous();
        let b = Credentials::anonymous();
        assert!(a.matches(&b));

        let named = Credentials::new("cn=a,dc=example,dc=com", "pw");
        assert!(!a.matches(&named));
        assert!(!named.matches(&a));
    }

    #[test]
    fn distinct_dns_never_match_even_with_same_secret() {
        let a = Credentials::new("cn=a,dc=example,dc=com", "shared-secret");
        let b = Credentials::new("cn=b,dc=example,dc=com", "shared-secret");
        assert!(!a.matches(&b));
    }

    #[test]
    fn identical_pairs_match() {
        let a = Credentials::new("cn=a,dc=example,dc=com", "pw");
        let b = Credentials::new("cn=a,dc=example,dc=com", "pw");
        assert!(a.matches(&b));
    }
}
