//! Job that runs one indexing pass.
//!
//! Overlapping ticks are skipped inside [`IndexRun::execute`].

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::indexer::IndexRun;

pub async fn run(index_run: &IndexRun) -> Result<()> {
    let Some(report) = index_run.execute(Utc::now()).await? else {
        return Ok(());
    };

    if let Some(pools) = report.pools {
        info!(
            "index_run wrote {} pool snapshots ({} unchanged, {} rejected)",
            pools.written, pools.unchanged, pools.rejected
        );
    }

    Ok(())
}
