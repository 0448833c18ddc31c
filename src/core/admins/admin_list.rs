// Admin allow-list - the users who receive moderation alerts and may edit the list.
//
// Owned by the Discord layer and handed to action delivery by reference.
// The moderation core never reads it.

use std::collections::BTreeSet;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AdminListError {
    #[error("User {0} is already an admin")]
    AlreadyAdmin(u64),

    #[error("User {0} is not an admin")]
    NotAdmin(u64),

    #[error("Refusing to remove the last admin")]
    LastAdmin,
}

/// Point-in-time copy of the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSnapshot {
    /// Bumped on every change
    pub version: u64,
    pub ids: Vec<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    version: u64,
    ids: BTreeSet<u64>,
}

#[derive(Debug, Default)]
pub struct AdminAllowList {
    inner: RwLock<Inner>,
}

impl AdminAllowList {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                version: 0,
                ids: ids.into_iter().collect(),
            }),
        }
    }

    /// Parse a comma-separated id list such as the `ADMIN_IDS` variable.
    ///
    /// Entries that aren't numbers are skipped with a warning.
    pub fn from_csv(raw: &str) -> Self {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<u64>() {
                Ok(id) if id != 0 => Some(id),
                _ => {
                    tracing::warn!("Ignoring invalid admin id '{}'", s);
                    None
                }
            });
        Self::new(ids)
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.read().ids.contains(&user_id)
    }

    pub fn snapshot(&self) -> AdminSnapshot {
        let inner = self.read();
        AdminSnapshot {
            version: inner.version,
            ids: inner.ids.iter().copied().collect(),
        }
    }

    /// Add an admin. Returns the new version.
    pub fn add(&self, user_id: u64) -> Result<u64, AdminListError> {
        let mut inner = self.write();
        if !inner.ids.insert(user_id) {
            return Err(AdminListError::AlreadyAdmin(user_id));
        }
        inner.version += 1;
        tracing::info!(user_id, version = inner.version, "Admin added");
        Ok(inner.version)
    }

    /// Remove an admin. The list can't be emptied. Returns the new version.
    pub fn remove(&self, user_id: u64) -> Result<u64, AdminListError> {
        let mut inner = self.write();
        if !inner.ids.contains(&user_id) {
            return Err(AdminListError::NotAdmin(user_id));
        }
        if inner.ids.len() == 1 {
            return Err(AdminListError::LastAdmin);
        }
        inner.ids.remove(&user_id);
        inner.version += 1;
        tracing::info!(user_id, version = inner.version, "Admin removed");
        Ok(inner.version)
    }

    // A poisoned lock only means a panic happened mid-update of a plain set;
    // the data is still usable.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
