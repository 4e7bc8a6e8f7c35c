//! Security token classification
//!
//! A token is parsed once, structurally, into one of the supported
//! schemes. Field values stay raw strings here; semantic validation
//! (uuid, algorithm, strategy) happens during dispatch so a malformed
//! field fails the same way as a wrong one.

use std::fmt;

/// A classified security token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityToken {
    /// `-mmac:{msid}:{algo}:{kds}:{prm}:{sig}`
    MasterMac {
        msid: String,
        algo: String,
        kds: String,
        prm: String,
        sig: String,
    },
    /// `-smac:{user}:{algo}:{sig}`
    StatelessMac {
        user: String,
        algo: String,
        sig: String,
    },
    /// `{user}:{secret}`
    ClearSecret { user: String, secret: String },
    /// Anything else, including the empty token
    Anonymous,
}

impl SecurityToken {
    /// Classify a raw token string.
    ///
    /// The scheme prefix alone selects the scheme: a `-mmac`/`-smac`
    /// token with missing fields still enters MAC verification (with
    /// empty fields that cannot verify) and fails there, masked. Only
    /// unprefixed shapes may be `ClearSecret` (exactly two fields) or
    /// `Anonymous`; a truncated MAC token never downgrades to a
    /// weaker scheme.
    pub fn parse(sec: &str) -> Self {
        let fields: Vec<&str> = sec.split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("").to_string();

        match fields[0] {
            "-mmac" => Self::MasterMac {
                msid: field(1),
                algo: field(2),
                kds: field(3),
                prm: field(4),
                sig: field(5),
            },
            "-smac" => Self::StatelessMac {
                user: field(1),
                algo: field(2),
                sig: field(3),
            },
            _ if fields.len() == 2 => Self::ClearSecret {
                user: fields[0].to_string(),
                secret: fields[1].to_string(),
            },
            _ => Self::Anonymous,
        }
    }
}

impl fmt::Display for SecurityToken {
    /// Canonical wire encoding; the inverse of [`SecurityToken::parse`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MasterMac {
                msid,
                algo,
                kds,
                prm,
                sig,
            } => write!(f, "-mmac:{msid}:{algo}:{kds}:{prm}:{sig}"),
            Self::StatelessMac { user, algo, sig } => {
                write!(f, "-smac:{user}:{algo}:{sig}")
            }
            Self::ClearSecret { user, secret } => write!(f, "{user}:{secret}"),
            Self::Anonymous => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_master_mac() {
        let token = SecurityToken::parse("-mmac:K1:HS256:HKDF256:20180101:c2ln");
        assert_eq!(
            token,
            SecurityToken::MasterMac {
                msid: "K1".to_string(),
                algo: "HS256".to_string(),
                kds: "HKDF256".to_string(),
                prm: "20180101".to_string(),
                sig: "c2ln".to_string(),
            }
        );
    }

    #[test]
    fn classifies_stateless_mac() {
        let token = SecurityToken::parse("-smac:U1:HS256:c2ln");
        assert_eq!(
            token,
            SecurityToken::StatelessMac {
                user: "U1".to_string(),
                algo: "HS256".to_string(),
                sig: "c2ln".to_string(),
            }
        );
    }

    #[test]
    fn two_fields_are_clear_secret() {
        let token = SecurityToken::parse("user1:hunter2");
        assert_eq!(
            token,
            SecurityToken::ClearSecret {
                user: "user1".to_string(),
                secret: "hunter2".to_string(),
            }
        );
    }

    #[test]
    fn unprefixed_shapes_are_anonymous() {
        for sec in ["", "justone", "a:b:c", "a:b:c:d"] {
            assert_eq!(SecurityToken::parse(sec), SecurityToken::Anonymous, "{sec:?}");
        }
    }

    #[test]
    fn prefix_selects_the_scheme_regardless_of_field_count() {
        // Truncated tokens keep their scheme with empty fields; they
        // must fail inside MAC verification, not downgrade.
        assert_eq!(
            SecurityToken::parse("-mmac:x"),
            SecurityToken::MasterMac {
                msid: "x".to_string(),
                algo: String::new(),
                kds: String::new(),
                prm: String::new(),
                sig: String::new(),
            }
        );
        assert_eq!(
            SecurityToken::parse("-smac:a:b"),
            SecurityToken::StatelessMac {
                user: "a".to_string(),
                algo: "b".to_string(),
                sig: String::new(),
            }
        );
        assert!(matches!(
            SecurityToken::parse("-mmac:way:too:many:fields:here:extra"),
            SecurityToken::MasterMac { .. }
        ));
        assert!(matches!(
            SecurityToken::parse("-smac:a:b:c:d"),
            SecurityToken::StatelessMac { .. }
        ));
    }

    #[test]
    fn display_round_trips_non_anonymous() {
        for sec in [
            "-mmac:K1:HS256:HKDF256:20180101:c2ln",
            "-smac:U1:HS512:c2ln",
            "user1:hunter2",
        ] {
            assert_eq!(SecurityToken::parse(sec).to_string(), sec);
        }
    }
}
