//! Output channel between the acquisition worker and the consumer
//!
//! A bounded single-producer/single-consumer channel of [`IqBlock`]s. When the
//! consumer falls behind, the worker blocks on publish (backpressure) until
//! either the consumer drains a block or the engine is told to stop. When
//! the consumer drops its end, the worker exits cleanly.

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError, TrySendError,
};
use std::time::Duration;

/// Default number of blocks that may be queued before the worker blocks
pub const DEFAULT_CHANNEL_DEPTH: usize = 16;

/// One converted block of interleaved `f32` I/Q samples
#[derive(Debug, Clone, PartialEq)]
pub struct IqBlock {
    /// Interleaved `I, Q, I, Q, ...`, normalized to roughly [-1, 1]
    pub data: Vec<f32>,
    /// Sample rate the block was captured at, in Hz
    pub sample_rate: u32,
    /// Position of this block since the engine started (0-based)
    pub sequence: u64,
}

impl IqBlock {
    /// Number of complex samples in the block
    pub fn samples(&self) -> usize {
        self.data.len() / 2
    }

    /// Time span covered by the block
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples() as f64 / self.sample_rate as f64)
    }
}

/// Producer end, owned by the acquisition worker
#[derive(Debug, Clone)]
pub struct BlockSender {
    sender: Sender<IqBlock>,
    spare: Receiver<Vec<f32>>,
}

impl BlockSender {
    /// Publish a block, blocking while the channel is full
    pub fn send(&self, block: IqBlock) -> Result<(), SendError<IqBlock>> {
        self.sender.send(block)
    }

    pub fn try_send(&self, block: IqBlock) -> Result<(), TrySendError<IqBlock>> {
        self.sender.try_send(block)
    }

    /// Zeroed sample storage of `len` values, reusing recycled storage
    pub fn take_buffer(&self, len: usize) -> Vec<f32> {
        match self.spare.try_recv() {
            Ok(mut data) => {
                data.clear();
                data.resize(len, 0.0);
                data
            }
            Err(_) => vec![0.0; len],
        }
    }

    /// Underlying crossbeam sender (for `select!`)
    pub(crate) fn inner(&self) -> &Sender<IqBlock> {
        &self.sender
    }
}

/// Create a bounded output channel
///
/// Up to `depth` recycled buffers are kept for reuse.
pub fn output_channel(depth: usize) -> (BlockSender, BlockReceiver) {
    let depth = depth.max(1);
    let (tx, rx) = bounded(depth);
    let (spare_tx, spare_rx) = bounded(depth);
    (
        BlockSender {
            sender: tx,
            spare: spare_rx,
        },
        BlockReceiver {
            receiver: rx,
            spare: spare_tx,
        },
    )
}

/// Consumer end of the output channel
#[derive(Debug)]
pub struct BlockReceiver {
    receiver: Receiver<IqBlock>,
    spare: Sender<Vec<f32>>,
}

impl BlockReceiver {
    /// Hand a consumed block's storage back to the worker
    ///
    /// Storage beyond what the pool holds is dropped.
    pub fn recycle(&self, block: IqBlock) {
        let _ = self.spare.try_send(block.data);
    }

    /// Block until the next sample block arrives
    ///
    /// Returns `None` once every sender is gone and the queue is empty.
    pub fn recv(&self) -> Option<IqBlock> {
        self.receiver.recv().ok()
    }

    /// Try to receive a block without blocking
    pub fn try_recv(&self) -> Option<IqBlock> {
        match self.receiver.try_recv() {
            Ok(block) => Some(block),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next block
    pub fn recv_timeout(&self, timeout: Duration) -> Option<IqBlock> {
        match self.receiver.recv_timeout(timeout) {
            Ok(block) => Some(block),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receive all pending blocks
    pub fn drain(&self) -> Vec<IqBlock> {
        let mut blocks = Vec::new();
        while let Ok(block) = self.receiver.try_recv() {
            blocks.push(block);
        }
        blocks
    }

    /// Number of blocks waiting to be consumed
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Access the underlying crossbeam receiver (e.g. for `select!`)
    pub fn inner(&self) -> &Receiver<IqBlock> {
        &self.receiver
    }
}
