//! The modem loop: shared-memory link to the host on one side, the local
//! I/O queues on the other, the FM audio chains in between.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::constants::FM_TX_BUFFER_SIZE;
use crate::error::{ModemError, Result};
use crate::fixed_point::Q15;
use crate::fm::{FmRx, FmTx, RxState, TxState};
use crate::io::IoContext;
use crate::transport::{Role, SharedMemoryIpc};

/// Baseband blocks kept queued ahead of the TX worker
const TX_LEAD_BLOCKS: usize = 2;

/// FM chain state for reporting
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChainStatus {
    pub rx_state: RxState,
    pub tx_state: TxState,
    pub rssi: Option<u16>,
    pub rx_frames: u64,
    pub tx_dropped: u64,
}

/// Moves audio between the host and the I/O workers.
///
/// TX: host ring → [`FmTx`] → local TX queue, kept `TX_LEAD_BLOCKS` blocks
/// ahead of the TX worker so the carrier never starves. RX: local RX queue
/// → [`FmRx`] → host ring, one 20 ms frame at a time while squelch is open.
pub struct ModemLoop {
    io: Arc<IoContext>,
    ipc: SharedMemoryIpc,
    fm_tx: FmTx,
    fm_rx: FmRx,
    host_audio: Vec<Q15>,
    tx_block: Vec<Q15>,
    rx_block: Vec<Q15>,
    rssi: Vec<u16>,
    tx_lead: usize,
}

impl ModemLoop {
    pub fn new(io: Arc<IoContext>, ipc: SharedMemoryIpc) -> Result<Self> {
        if ipc.role() != Role::Modem {
            return Err(ModemError::InvalidParameter(
                "modem loop needs the modem end of the shared-memory link".to_string(),
            ));
        }
        let fm = &io.config().fm;
        let fm_tx = FmTx::from_config(fm);
        let fm_rx = FmRx::from_config(fm);
        let block = io.config().io.block_size;
        Ok(Self {
            fm_tx,
            fm_rx,
            ipc,
            host_audio: vec![0; FM_TX_BUFFER_SIZE],
            tx_block: vec![0; block],
            rx_block: vec![0; block],
            rssi: vec![0; block],
            tx_lead: TX_LEAD_BLOCKS * block,
            io,
        })
    }

    pub fn ipc(&self) -> &SharedMemoryIpc {
        &self.ipc
    }

    pub fn fm_tx(&mut self) -> &mut FmTx {
        &mut self.fm_tx
    }

    pub fn fm_rx(&mut self) -> &mut FmRx {
        &mut self.fm_rx
    }

    pub fn status(&self) -> ChainStatus {
        ChainStatus {
            rx_state: self.fm_rx.state(),
            tx_state: self.fm_tx.state(),
            rssi: self.fm_rx.rssi(),
            rx_frames: self.fm_rx.frames(),
            tx_dropped: self.fm_tx.dropped(),
        }
    }

    /// One pass over both directions. Returns the number of samples moved.
    pub fn run_once(&mut self) -> usize {
        self.pump_tx() + self.pump_rx()
    }

    /// Loop until the I/O context shuts down.
    pub fn run(&mut self) {
        let idle = Duration::from_micros(self.io.config().io.idle_sleep_us);
        log::info!("Modem loop started");
        while self.io.is_running() {
            if self.run_once() == 0 {
                thread::sleep(idle);
            }
        }
        log::info!("Modem loop stopped");
    }

    fn pump_tx(&mut self) -> usize {
        // Take only what is there, so a quiet host is not an underrun.
        let want = self.fm_tx.space().min(self.ipc.tx_available());
        let got = self.ipc.read_tx(&mut self.host_audio[..want]);
        self.fm_tx.write_samples(&self.host_audio[..got]);

        let mut moved = got;
        let queue = self.io.tx_queue();
        while queue.available() < self.tx_lead && queue.space() >= self.tx_block.len() {
            self.fm_tx.get_samples(&mut self.tx_block);
            moved += queue.write(&self.tx_block, None);
        }
        moved
    }

    fn pump_rx(&mut self) -> usize {
        let count = {
            let mut queue = self.io.rx_queue().lock();
            let n = queue.available().min(self.rx_block.len());
            queue.read(&mut self.rx_block[..n], Some(&mut self.rssi[..n]))
        };
        if count == 0 {
            return 0;
        }
        let ipc = &mut self.ipc;
        let mut to_host = |frame: &[Q15], _rssi: Option<u16>| {
            ipc.write_rx_frame(frame);
        };
        self.fm_rx
            .samples(&self.rx_block[..count], Some(&self.rssi[..count]), &mut to_host);
        count
    }
}
