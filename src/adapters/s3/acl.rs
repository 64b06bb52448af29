use crate::utils::error::{DataSourceError, Result};
use std::fmt;

pub const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
pub const AUTHENTICATED_USERS: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// One entry of an access control list as returned by S3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee_uri: Option<String>,
    pub grantee_id: Option<String>,
    pub permission: String,
}

impl Grant {
    pub fn group(uri: &str, permission: &str) -> Self {
        Self {
            grantee_uri: Some(uri.to_string()),
            grantee_id: None,
            permission: permission.to_string(),
        }
    }

    pub fn owner(id: &str) -> Self {
        Self {
            grantee_uri: None,
            grantee_id: Some(id.to_string()),
            permission: "FULL_CONTROL".to_string(),
        }
    }
}

/// Canned ACL as exposed on bucket and object rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AclOption {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
}

impl AclOption {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(AclOption::Private),
            "public-read" => Ok(AclOption::PublicRead),
            "public-read-write" => Ok(AclOption::PublicReadWrite),
            "authenticated-read" => Ok(AclOption::AuthenticatedRead),
            other => Err(DataSourceError::invalid_query(format!(
                "unknown ACL '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AclOption::Private => "private",
            AclOption::PublicRead => "public-read",
            AclOption::PublicReadWrite => "public-read-write",
            AclOption::AuthenticatedRead => "authenticated-read",
        }
    }

    /// Collapses a grant list to the closest canned ACL. Group grants decide;
    /// owner grants never widen access.
    pub fn from_grants(grants: &[Grant]) -> Self {
        let granted = |uri: &str, permission: &str| {
            grants
                .iter()
                .any(|g| g.grantee_uri.as_deref() == Some(uri) && g.permission == permission)
        };

        if granted(ALL_USERS, "WRITE") {
            AclOption::PublicReadWrite
        } else if granted(ALL_USERS, "READ") {
            AclOption::PublicRead
        } else if granted(AUTHENTICATED_USERS, "READ") {
            AclOption::AuthenticatedRead
        } else {
            AclOption::Private
        }
    }
}

impl fmt::Display for AclOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
