use std::sync::Arc;

use async_trait::async_trait;

use crate::models::UserAccount;
use crate::store::{Collection, DocumentStore, Filter, StoreResult, USERS};

/// Source of the active-user count used by the skip threshold.
#[async_trait]
pub trait ActiveUsers: Send + Sync {
    async fn active_user_count(&self) -> StoreResult<u64>;
}

/// Counts user documents flagged `active`.
pub struct StoreActiveUsers {
    users: Collection<UserAccount>,
}

impl StoreActiveUsers {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(store, USERS),
        }
    }
}

#[async_trait]
impl ActiveUsers for StoreActiveUsers {
    async fn active_user_count(&self) -> StoreResult<u64> {
        self.users
            .count(&Filter::Matches(serde_json::json!({ "active": true })))
            .await
    }
}

/// A constant count, for tests and single-room deployments.
pub struct FixedActiveUsers(pub u64);

#[async_trait]
impl ActiveUsers for FixedActiveUsers {
    async fn active_user_count(&self) -> StoreResult<u64> {
        Ok(self.0)
    }
}

/// Votes needed to skip a track: a strict majority of active users plus one.
pub fn required_skip_votes(active_users: u64) -> u64 {
    active_users.div_ceil(2) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn threshold_is_half_rounded_up_plus_one() {
        assert_eq!(required_skip_votes(0), 1);
        assert_eq!(required_skip_votes(1), 2);
        assert_eq!(required_skip_votes(4), 3);
        assert_eq!(required_skip_votes(5), 4);
    }

    #[tokio::test]
    async fn only_active_accounts_are_counted() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users: Collection<UserAccount> = Collection::new(store.clone(), USERS);
        for (id, active) in [("a", true), ("b", false), ("c", true)] {
            users
                .insert(&UserAccount {
                    id: id.to_string(),
                    active,
                })
                .await
                .unwrap();
        }
        let count = StoreActiveUsers::new(store).active_user_count().await.unwrap();
        assert_eq!(count, 2);
    }
}
