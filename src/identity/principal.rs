use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which verification authority vouched for an identity. Set once when the identity is
/// produced and carried with it from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    SuperAdmin,
    Admin,
}

impl Authority {
    /// Verification order for the synchronous path.
    pub const ORDER: [Authority; 2] = [Authority::SuperAdmin, Authority::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::SuperAdmin => "super_admin",
            Authority::Admin => "admin",
        }
    }

    /// Role reported when the authority's payload names none.
    pub fn default_role(&self) -> &'static str { self.as_str() }

    /// Field a principal from this authority must carry.
    pub fn required_field(&self) -> &'static str {
        match self {
            Authority::SuperAdmin => "email",
            Authority::Admin => "username",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Opaque record owned by the authority that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub Map<String, Value>);

impl Principal {
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(m) => Some(Principal(m)),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Shape check against the authority tag; the tag itself is never derived from this.
    pub fn fits(&self, authority: Authority) -> bool {
        self.get_str(authority.required_field()).map(|s| !s.trim().is_empty()).unwrap_or(false)
    }

    /// Human-readable handle for logs.
    pub fn display_name(&self) -> &str {
        self.get_str("username").or_else(|| self.get_str("email")).unwrap_or("<anonymous>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub authority: Authority,
    pub role: String,
    pub principal: Principal,
}

impl Identity {
    pub fn new<S: Into<String>>(authority: Authority, role: S, principal: Principal) -> Self {
        Self { authority, role: role.into(), principal }
    }

    pub fn is_super_admin(&self) -> bool { self.authority == Authority::SuperAdmin }

    /// Support administrators verify through the admin authority with role `support`.
    pub fn is_support(&self) -> bool {
        self.authority == Authority::Admin && self.role.eq_ignore_ascii_case("support")
    }
}
