//! Cookie descriptors for carrying session identifiers.
//!
//! Only rendering lives here; reading the incoming cookie is left to the
//! HTTP layer, which hands the identifier to
//! [`SessionStore::resolve`](crate::SessionStore::resolve).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attribute policy applied to every session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieOptions {
    /// Cookie path
    pub path: String,
    /// Cookie domain
    pub domain: Option<String>,
    /// Secure flag (HTTPS only)
    pub secure: bool,
    /// HttpOnly flag
    pub http_only: bool,
    /// CHIPS partitioned cookie
    pub partitioned: bool,
    /// SameSite policy
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            partitioned: false,
            same_site: SameSite::Strict,
        }
    }
}

impl CookieOptions {
    /// Set cookie path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set cookie domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set cookie secure flag
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set cookie HttpOnly flag
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the partitioned flag
    pub fn with_partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Cookie carrying `value` until `expires`.
    pub fn cookie(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
        expires: DateTime<Utc>,
        max_age: i64,
    ) -> SessionCookie {
        SessionCookie {
            name: name.into(),
            value: value.into(),
            expires,
            max_age,
            options: self.clone(),
        }
    }

    /// Cookie telling the client to drop `name` immediately.
    pub fn removal(&self, name: impl Into<String>) -> SessionCookie {
        self.cookie(name, "", DateTime::<Utc>::UNIX_EPOCH, -1)
    }
}

/// A rendered-on-demand `Set-Cookie` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub expires: DateTime<Utc>,
    /// Seconds until expiry; negative means "delete now"
    pub max_age: i64,
    pub options: CookieOptions,
}

impl SessionCookie {
    pub fn is_removal(&self) -> bool {
        self.max_age < 0
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, self.options.path);

        if let Some(ref domain) = self.options.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str(&format!(
            "; Expires={}",
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
        cookie.push_str(&format!("; Max-Age={}", self.max_age.max(0)));

        if self.options.secure {
            cookie.push_str("; Secure");
        }

        if self.options.http_only {
            cookie.push_str("; HttpOnly");
        }

        if self.options.partitioned {
            cookie.push_str("; Partitioned");
        }

        cookie.push_str(&format!("; SameSite={}", self.options.same_site.as_str()));
        cookie
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}
