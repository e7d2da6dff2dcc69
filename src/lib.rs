pub mod bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod fixed_point;
pub mod fm;
pub mod frontend;
pub mod io;
pub mod modem;
pub mod output;
pub mod signal_processing;
pub mod transport;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use bridge::ModemLoop;
pub use config::ModemConfig;
pub use error::{ModemError, Result};
pub use io::{IoContext, RxWorker, TxWorker};
