//! Run orchestration
//!
//! One [`Relay::run`] is one cron tick: pick the accounts to poll, fetch
//! their unseen posts, publish each one, and commit the ids that were
//! delivered. State is written once at the end and only if something was
//! delivered, so a run interrupted halfway is equivalent to a run that found
//! nothing; the next run simply picks the same posts up again.

use std::sync::Arc;
use tracing::{error, info};

use crate::rotation::select_accounts;
use crate::sink::PostSink;
use crate::source::PostSource;
use crate::state::{StateStore, StateStoreExt};
use crate::types::{Account, RunOptions, RunReport};

/// Number of characters of a post shown in dry-run logs
const DRY_RUN_PREVIEW_CHARS: usize = 30;

pub struct Relay {
    accounts: Vec<Account>,
    store: Arc<dyn StateStore>,
    source: Box<dyn PostSource>,
    sink: Box<dyn PostSink>,
}

impl Relay {
    pub fn new(
        accounts: Vec<Account>,
        store: Arc<dyn StateStore>,
        source: Box<dyn PostSource>,
        sink: Box<dyn PostSink>,
    ) -> Self {
        Self {
            accounts,
            store,
            source,
            sink,
        }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub async fn run(&self, options: RunOptions) -> RunReport {
        let mut processed = self.store.load_processed();
        let mut report = RunReport::default();

        let selected = select_accounts(&self.accounts, self.store.as_ref(), options.force_all);

        for account in selected {
            report.polled.push(account.handle.clone());
            info!("Checking for new posts from {}", account.handle);

            let known = processed.ids_for(&account.handle);
            let new_posts = self.source.fetch_new(account, &known).await;

            if new_posts.is_empty() {
                info!("No new posts from {}", account.handle);
                continue;
            }

            for post in new_posts {
                let delivered = if options.dry_run {
                    let preview: String = post.text.chars().take(DRY_RUN_PREVIEW_CHARS).collect();
                    info!(
                        "DRY RUN - would send post {} to topic {}: {}...",
                        post.id, account.topic_id, preview
                    );
                    true
                } else {
                    self.sink.publish(&post, &account.topic_id).await
                };

                if delivered {
                    processed.record(&account.handle, &post.id);
                    report.processed_count += 1;
                } else {
                    report.failed_count += 1;
                }
            }
        }

        if report.processed_count == 0 {
            info!("No new posts to process");
            return report;
        }

        info!("Processed {} new posts", report.processed_count);
        if let Err(e) = self.store.save_processed(&processed) {
            error!("Error saving processed posts: {}", e);
        }

        report
    }
}
