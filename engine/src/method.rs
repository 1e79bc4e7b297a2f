//! CRUD verbs and their HTTP mapping.
//!
//! Requests name their verb either as an HTTP method (`"GET"`, `"put"`) or as
//! a CRUD action (`"read"`, `"update"`). HTTP names win; CRUD names are mapped
//! through a fixed table; anything else is a configuration error.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP methods a transport may be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Get,
    Put,
    Delete,
    Patch,
    Head,
}

/// CRUD actions, as used by models and collections when picking a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crud {
    Create,
    Read,
    Update,
    Delete,
    Patch,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Post,
        Method::Get,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }

    /// Resolve a verb that is either an HTTP method or a CRUD action.
    pub fn resolve(verb: &str) -> Result<Method> {
        if let Some(method) = Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(verb))
        {
            return Ok(method);
        }
        Crud::from_str(verb).map(Method::from)
    }

    /// Whether requests with this method carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl Crud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Crud::Create => "create",
            Crud::Read => "read",
            Crud::Update => "update",
            Crud::Delete => "delete",
            Crud::Patch => "patch",
        }
    }
}

impl From<Crud> for Method {
    fn from(crud: Crud) -> Self {
        match crud {
            Crud::Create => Method::Post,
            Crud::Read => Method::Get,
            Crud::Update => Method::Put,
            Crud::Delete => Method::Delete,
            Crud::Patch => Method::Patch,
        }
    }
}

impl FromStr for Crud {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Crud::Create),
            "read" => Ok(Crud::Read),
            "update" => Ok(Crud::Update),
            "delete" => Ok(Crud::Delete),
            "patch" => Ok(Crud::Patch),
            _ => Err(Error::UnknownVerb(s.to_string())),
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::resolve(s)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Crud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_verbs_are_case_insensitive() {
        assert_eq!(Method::resolve("GET").unwrap(), Method::Get);
        assert_eq!(Method::resolve("post").unwrap(), Method::Post);
        assert_eq!(Method::resolve("Head").unwrap(), Method::Head);
    }

    #[test]
    fn crud_verbs_map_to_http() {
        assert_eq!(Method::resolve("create").unwrap(), Method::Post);
        assert_eq!(Method::resolve("read").unwrap(), Method::Get);
        assert_eq!(Method::resolve("update").unwrap(), Method::Put);
        assert_eq!(Method::resolve("delete").unwrap(), Method::Delete);
        assert_eq!(Method::resolve("PATCH").unwrap(), Method::Patch);
        assert_eq!(Method::resolve("Read").unwrap(), Method::Get);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let err = Method::resolve("fetch").unwrap_err();
        assert_eq!(err, Error::UnknownVerb("fetch".into()));
        assert!(err.is_config());
    }

    #[test]
    fn body_bearing_methods() {
        assert!(Method::Post.has_body());
        assert!(Method::Patch.has_body());
        assert!(!Method::Get.has_body());
        assert!(!Method::Delete.has_body());
    }

    #[test]
    fn serialization_format() {
        assert_eq!(serde_json::to_string(&Method::Patch).unwrap(), "\"PATCH\"");
        assert_eq!(serde_json::to_string(&Crud::Update).unwrap(), "\"update\"");
    }
}
