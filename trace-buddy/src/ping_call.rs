use std::sync::Arc;

use clap::Args;
use log::debug;

use crate::probe::ProbeExecutor;

pub use self::caller::Caller;

mod caller;

#[derive(Args, Clone, Debug)]
#[group(id = "ping")]
pub struct Params {
    /// FQ path to ping binary
    #[arg(long, default_value = "/usr/bin/ping", env = "PING_BIN_PATH")]
    bin_path: String,
}

impl Params {
    pub fn to_caller(&self) -> Caller {
        let caller = Caller::new(self.bin_path.to_string());
        debug!("Using ping caller: {:?}", caller);
        caller
    }

    pub fn to_executor(&self) -> Arc<dyn ProbeExecutor> {
        Arc::new(self.to_caller())
    }
}
