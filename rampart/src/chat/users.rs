use rampart_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Credentials of a pre-provisioned account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub id: u64,
}

/// Accounts virtual users log in as. Never empty, shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPool {
    users: Vec<TestUser>,
}

impl UserPool {
    pub fn new(users: Vec<TestUser>) -> Result<Self, ConfigError> {
        if users.is_empty() {
            return Err(ConfigError::EmptyUserPool);
        }
        Ok(Self { users })
    }

    /// `test1@test.com` through `test5@test.com`, ids 1 to 5.
    pub fn builtin() -> Self {
        Self {
            users: (1..=5)
                .map(|id| TestUser {
                    email: format!("test{id}@test.com"),
                    password: "test1234".to_string(),
                    id,
                })
                .collect(),
        }
    }

    /// Reads a JSON array of `{email, password, id}` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let users = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(users)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Pool position assigned to the virtual user with the given 1-based id.
    pub fn index_for(&self, ordinal: u64) -> usize {
        (ordinal.saturating_sub(1) % self.users.len() as u64) as usize
    }

    pub fn get(&self, index: usize) -> &TestUser {
        &self.users[index % self.users.len()]
    }

    /// The next account in the pool, wrapping around.
    pub fn partner_of(&self, index: usize) -> &TestUser {
        self.get((index + 1) % self.users.len())
    }
}
