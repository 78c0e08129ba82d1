//! Consumer side of the session

use crate::update::Update;

/// Receives updates one at a time, in ascending `update_id` order
///
/// Runs on the blocking pool. An error or panic is logged and counted; the session
/// moves on to the next update.
pub trait UpdateHandler: Send + Sync {
    fn on_update(&self, update: Update) -> anyhow::Result<()>;
}

impl<F> UpdateHandler for F
where
    F: Fn(Update) -> anyhow::Result<()> + Send + Sync,
{
    fn on_update(&self, update: Update) -> anyhow::Result<()> {
        self(update)
    }
}
