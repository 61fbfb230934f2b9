//! Daemon lifecycle: signal handling and volume recovery around start/stop

mod recovery;
mod shutdown;

pub use recovery::{recover_on_launch, restore_before_exit};
pub use shutdown::ShutdownSignal;
