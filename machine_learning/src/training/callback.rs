use crate::{Result, arch::LayerSummary};

use super::EpochLogs;

/// Hooks into the training loop of a `Trainer`. Errors abort the training.
pub trait Callback {
    fn on_train_begin(&mut self, _graph: &[LayerSummary]) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _epoch: usize, _logs: &EpochLogs) -> Result<()> {
        Ok(())
    }

    fn on_train_end(&mut self) -> Result<()> {
        Ok(())
    }
}
