use serde::Deserialize;
use serde::Serialize;
use std::fmt::Debug;
use std::fmt::Display;

/// Identifies a cached container. The account key is deliberately not a part of it: the same container reached with
/// a rotated key is still the same container.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerKey {
    pub endpoint:  String,
    pub database:  String,
    pub container: String,
}

impl ContainerKey {
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            endpoint:  endpoint.into(),
            database:  database.into(),
            container: container.into(),
        }
    }
}

impl Display for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.endpoint, self.database, self.container)
    }
}

impl Debug for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContainerKey({self})")
    }
}

/// Everything needed to reach a container.
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerArgs {
    pub endpoint:    String,
    pub account_key: String,
    pub database:    String,
    pub container:   String,
}

impl ContainerArgs {
    pub fn new(
        endpoint: impl Into<String>,
        account_key: impl Into<String>,
        database: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            endpoint:    endpoint.into(),
            account_key: account_key.into(),
            database:    database.into(),
            container:   container.into(),
        }
    }

    pub fn key(&self) -> ContainerKey {
        ContainerKey::new(&self.endpoint, &self.database, &self.container)
    }
}

// Keep the account key out of logs.
impl Debug for ContainerArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerArgs")
            .field("endpoint", &self.endpoint)
            .field("account_key", &"<redacted>")
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

/// A container as reported by a database listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key_path: Option<String>,
}

impl ContainerProperties {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id:                 id.into(),
            partition_key_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_ignores_account_key() {
        let a = ContainerArgs::new("https://db.example", "key-1", "main", "users");
        let b = ContainerArgs::new("https://db.example", "key-2", "main", "users");
        assert_eq!(a.key(), b.key());

        let keys = [a.key(), b.key(), ContainerKey::new("https://db.example", "main", "orders")]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn args_debug_hides_account_key() {
        let args = ContainerArgs::new("https://db.example", "s3cr3t", "main", "users");
        let dbg = format!("{args:?}");
        assert!(!dbg.contains("s3cr3t"));
        assert!(dbg.contains("users"));
        assert_eq!(args.key().to_string(), "https://db.example/main/users");
    }
}
