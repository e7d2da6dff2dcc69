//! Sample transport: SPSC rings, locked local queues and the shared-memory
//! link to the host.

pub mod queue;
pub mod ring;
pub mod shm;

pub use queue::{QueueState, SampleQueue};
pub use ring::{Consumer, Producer, RingBuffer, RingStats, spsc};
pub use shm::{IpcStats, Role, SharedMemoryIpc, SharedRegion};
