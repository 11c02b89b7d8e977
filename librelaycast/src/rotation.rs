//! Round-robin account selection
//!
//! Upstream quotas allow roughly two calls per account per run (user lookup
//! plus recent posts), so by default each run polls a single account and
//! the persisted cursor advances one step per run.

use tracing::{error, info};

use crate::state::{StateStore, StateStoreExt};
use crate::types::Account;

/// Index of the account to poll after `cursor`
///
/// An absent or unknown cursor starts from the first account. `accounts`
/// must not be empty.
pub fn next_index(accounts: &[Account], cursor: Option<&str>) -> usize {
    cursor
        .and_then(|handle| accounts.iter().position(|a| a.handle == handle))
        .map(|index| (index + 1) % accounts.len())
        .unwrap_or(0)
}

/// Pick the accounts to poll this run
///
/// Rotation applies only with two or more accounts and without
/// `force_all`. The new cursor is written before anything is fetched, so a
/// crash later in the run still advances the rotation. Any cursor I/O
/// failure falls back to polling every account.
pub fn select_accounts<'a>(
    accounts: &'a [Account],
    store: &dyn StateStore,
    force_all: bool,
) -> Vec<&'a Account> {
    if force_all || accounts.len() < 2 {
        return accounts.iter().collect();
    }

    let cursor = match store.load_cursor() {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error with account rotation, processing all accounts: {}", e);
            return accounts.iter().collect();
        }
    };

    let selected = &accounts[next_index(accounts, cursor.as_deref())];

    if let Err(e) = store.save_cursor(&selected.handle) {
        error!("Error with account rotation, processing all accounts: {}", e);
        return accounts.iter().collect();
    }

    info!("Processing account {} (rotational mode)", selected.handle);
    vec![selected]
}
