//! Composite vault key names
//!
//! Every key the vault holds is addressed by a colon-joined external id
//! built from stable identifiers. The same inputs always produce the
//! same name, which is what makes key lookup and idempotent derivation
//! work without any extra mapping table.

use std::fmt;

use uuid::Uuid;

use super::mac::{KeyDerivationStrategy, MacFamily};

/// What a derived key is allowed to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    Mac,
    Enc,
}

impl KeyPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mac => "MAC",
            Self::Enc => "ENC",
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External id of a master key: `{user}:MSTR:{scope}:{index}`
///
/// `scope` is empty for the primary exchange key. `index` alternates
/// between 1 and 2 across rotations so the old key survives until the
/// new one is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyName {
    pub user: Uuid,
    pub scope: String,
    pub index: u8,
}

impl MasterKeyName {
    pub fn new(user: Uuid, scope: &str, index: u8) -> Self {
        Self {
            user,
            scope: scope.to_string(),
            index,
        }
    }

    /// Prefix matching every master key of a user
    pub fn user_prefix(user: Uuid) -> String {
        format!("{user}:MSTR:")
    }

    /// Prefix matching every index of one scope
    pub fn scope_prefix(user: Uuid, scope: &str) -> String {
        format!("{user}:MSTR:{scope}:")
    }

    /// Decode an external id produced by `Display`
    pub fn parse(ext_id: &str) -> Option<Self> {
        let mut parts = ext_id.splitn(4, ':');
        let user = Uuid::parse_str(parts.next()?).ok()?;
        if parts.next()? != "MSTR" {
            return None;
        }
        let scope = parts.next()?.to_string();
        let index = parts.next()?.parse().ok()?;
        Some(Self { user, scope, index })
    }
}

impl fmt::Display for MasterKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:MSTR:{}:{}", self.user, self.scope, self.index)
    }
}

/// External id of a derived key:
/// `{master_id}:DRV:{kds}:{family}:{peer}:{purpose}:{param}`
///
/// `peer` is the requesting party's global id; together with the
/// purpose it forms the derivation salt, so the same master key yields
/// independent keys per peer and per use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyName {
    pub master_id: Uuid,
    pub kds: KeyDerivationStrategy,
    pub family: MacFamily,
    pub peer_global_id: String,
    pub purpose: KeyPurpose,
    pub param: String,
}

impl DerivedKeyName {
    /// Derivation salt: `{peer}:{purpose}`
    pub fn kdf_salt(&self) -> String {
        format!("{}:{}", self.peer_global_id, self.purpose)
    }

    /// Prefix matching every key derived from one master key
    pub fn master_prefix(master_id: Uuid) -> String {
        format!("{master_id}:DRV:")
    }
}

impl fmt::Display for DerivedKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:DRV:{}:{}:{}:{}",
            self.master_id,
            self.kds,
            self.family,
            self.kdf_salt(),
            self.param
        )
    }
}

/// Kind of stateless secret held for a user/service pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatelessKind {
    Password,
    Mac,
}

impl StatelessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "STLSPWD",
            Self::Mac => "STLSMAC",
        }
    }
}

impl fmt::Display for StatelessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External id of a stateless secret: `{user}:{service}:{kind}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatelessKeyName {
    pub user: Uuid,
    pub service: Uuid,
    pub kind: StatelessKind,
}

impl StatelessKeyName {
    pub fn new(user: Uuid, service: Uuid, kind: StatelessKind) -> Self {
        Self {
            user,
            service,
            kind,
        }
    }
}

impl fmt::Display for StatelessKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.service, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_name_layout() {
        let user = Uuid::new_v4();
        let name = MasterKeyName::new(user, "", 1);
        assert_eq!(name.to_string(), format!("{user}:MSTR::1"));
        assert!(name.to_string().starts_with(&MasterKeyName::user_prefix(user)));

        let scoped = MasterKeyName::new(user, "backup", 2);
        assert_eq!(scoped.to_string(), format!("{user}:MSTR:backup:2"));
        assert!(scoped
            .to_string()
            .starts_with(&MasterKeyName::scope_prefix(user, "backup")));
    }

    #[test]
    fn master_name_parse_round_trips() {
        let user = Uuid::new_v4();
        for name in [
            MasterKeyName::new(user, "", 1),
            MasterKeyName::new(user, "backup", 2),
        ] {
            assert_eq!(MasterKeyName::parse(&name.to_string()), Some(name));
        }
        assert_eq!(MasterKeyName::parse("not-a-key"), None);
        assert_eq!(MasterKeyName::parse(&format!("{user}:DRV::1")), None);
    }

    #[test]
    fn derived_name_embeds_salt() {
        let master_id = Uuid::new_v4();
        let name = DerivedKeyName {
            master_id,
            kds: "HKDF256".parse().unwrap(),
            family: MacFamily::Hmac,
            peer_global_id: "svc.example.com".to_string(),
            purpose: KeyPurpose::Mac,
            param: "20180101".to_string(),
        };

        assert_eq!(name.kdf_salt(), "svc.example.com:MAC");
        assert_eq!(
            name.to_string(),
            format!("{master_id}:DRV:HKDF256:HMAC:svc.example.com:MAC:20180101")
        );
    }

    #[test]
    fn same_inputs_same_name() {
        let master_id = Uuid::new_v4();
        let build = || DerivedKeyName {
            master_id,
            kds: "HKDF512".parse().unwrap(),
            family: MacFamily::Hmac,
            peer_global_id: "svc.example.com".to_string(),
            purpose: KeyPurpose::Enc,
            param: "p1".to_string(),
        };
        assert_eq!(build().to_string(), build().to_string());
    }

    #[test]
    fn stateless_name_layout() {
        let user = Uuid::new_v4();
        let service = Uuid::new_v4();
        let pwd = StatelessKeyName::new(user, service, StatelessKind::Password);
        let mac = StatelessKeyName::new(user, service, StatelessKind::Mac);
        assert_eq!(pwd.to_string(), format!("{user}:{service}:STLSPWD"));
        assert_eq!(mac.to_string(), format!("{user}:{service}:STLSMAC"));
    }
}
