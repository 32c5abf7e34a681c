//! Acquisition worker loop
//!
//! Runs on a dedicated thread, one per running engine. Each cycle:
//!
//! 1. Check the stop signal
//! 2. Refill the hardware buffer (the only blocking hardware call)
//! 3. Poll the underflow bit of the streaming core and clear it
//! 4. Poll the gain overdrive bit of the phy
//! 5. Convert the raw words to interleaved `f32`
//! 6. Publish the block, waiting for the consumer or the stop signal
//!
//! A failed refill ends the loop with a stream fault; it is never retried.
//! Hardware resources are held by [`StreamResources`] and released on every
//! exit path.

use super::convert::convert_block;
use super::output::{BlockSender, IqBlock};
use super::{EngineShared, StreamExit};
use crate::backend::iio_trait::{IioBuffer, IioChannel, IioDevice};
use crate::backend::registers::{self, StreamRoute};
use crate::error::AcqError;
use crate::types::{EngineState, SampleFormat};
use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// Enabled sample rails and the capture buffer of one run
///
/// Dropping disables both rails, then destroys the buffer.
pub(crate) struct StreamResources {
    i_channel: Arc<dyn IioChannel>,
    q_channel: Arc<dyn IioChannel>,
    buffer: Option<Box<dyn IioBuffer>>,
}

impl StreamResources {
    /// Enable the rails needed for `format`
    pub(crate) fn enable(
        i_channel: Arc<dyn IioChannel>,
        q_channel: Arc<dyn IioChannel>,
        format: SampleFormat,
    ) -> Self {
        i_channel.enable();
        if format.uses_q_rail() {
            q_channel.enable();
        } else {
            q_channel.disable();
        }
        Self {
            i_channel,
            q_channel,
            buffer: None,
        }
    }

    pub(crate) fn attach_buffer(&mut self, buffer: Box<dyn IioBuffer>) {
        self.buffer = Some(buffer);
    }
}

impl Drop for StreamResources {
    fn drop(&mut self) {
        self.i_channel.disable();
        self.q_channel.disable();
        // Buffer goes after the rails are disabled
        self.buffer.take();
    }
}

/// Reads the status registers once per cycle
pub(crate) struct HealthMonitor {
    pub(crate) phy: Arc<dyn IioDevice>,
    pub(crate) stream: Arc<dyn IioDevice>,
    pub(crate) route: StreamRoute,
    pub(crate) shared: Arc<EngineShared>,
}

impl HealthMonitor {
    /// Update the health flags from the status registers
    ///
    /// A failed register access leaves the corresponding flag unchanged.
    fn poll(&self) {
        match self.stream.reg_read(registers::STREAM_STATUS) {
            Ok(status) if status & registers::STATUS_UNDERFLOW_BIT != 0 => {
                tracing::warn!("Underflow!");
                self.shared.health.set_underflow(true);
                self.shared.counters.record_underflow();
                if let Err(e) = self.stream.reg_write(registers::STREAM_STATUS, status) {
                    tracing::warn!("Failed to clear underflow status: {}", e);
                }
            }
            Ok(_) => {
                self.shared.health.set_underflow(false);
            }
            Err(e) => tracing::debug!("Failed to read stream status: {}", e),
        }

        match self.phy.reg_read(self.route.overgain_register) {
            Ok(value) => {
                let overdrive = value & 1 != 0;
                let was = self.shared.health.set_overgain(overdrive);
                if overdrive {
                    self.shared.counters.record_overgain();
                    if !was {
                        tracing::warn!("Gain overdrive!");
                    }
                }
            }
            Err(e) => tracing::debug!("Failed to read gain status: {}", e),
        }
    }
}

/// State moved onto the worker thread
pub(crate) struct StreamWorker {
    pub(crate) resources: StreamResources,
    pub(crate) monitor: HealthMonitor,
    pub(crate) format: SampleFormat,
    pub(crate) sample_rate: u32,
    pub(crate) block_size: usize,
    pub(crate) output: BlockSender,
    pub(crate) stop_rx: Receiver<()>,
}

impl StreamWorker {
    /// Run until stopped, faulted or the consumer goes away
    pub(crate) fn run(mut self, ready: Sender<()>) -> StreamExit {
        tracing::info!(
            "Acquisition worker started ({} samples per block, {})",
            self.block_size,
            self.format
        );
        let _ = ready.send(());
        drop(ready);

        let exit = self.stream_loop();

        // Release channels and buffer before reporting idle
        drop(self.resources);
        self.monitor.shared.set_state(EngineState::Idle);

        match &exit {
            StreamExit::Stopped => tracing::info!("Acquisition worker stopped"),
            StreamExit::ConsumerClosed => tracing::info!("Consumer closed, acquisition worker exiting"),
            StreamExit::Fault(e) => tracing::error!("Acquisition worker failed: {}", e),
        }
        exit
    }

    fn stream_loop(&mut self) -> StreamExit {
        let mut sequence: u64 = 0;

        loop {
            match self.stop_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => return StreamExit::Stopped,
            }

            let Some(buffer) = self.resources.buffer.as_mut() else {
                return StreamExit::Fault(AcqError::StreamFault("no capture buffer".to_string()));
            };

            let available = match buffer.refill() {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.monitor.poll();
                    return StreamExit::Fault(AcqError::StreamFault(format!("refill failed: {}", e)));
                }
            };
            self.monitor.shared.counters.record_refill();

            if sequence == 0 {
                self.monitor.shared.set_state(EngineState::Streaming);
            }

            self.monitor.poll();

            let raw = buffer.as_bytes();
            let raw = &raw[..available.min(raw.len())];
            let mut data = self.output.take_buffer(self.block_size * 2);
            convert_block(self.format, raw, &mut data);

            let block = IqBlock {
                data,
                sample_rate: self.sample_rate,
                sequence,
            };

            select! {
                send(self.output.inner(), block) -> res => {
                    if res.is_err() {
                        return StreamExit::ConsumerClosed;
                    }
                }
                recv(self.stop_rx) -> _ => return StreamExit::Stopped,
            }

            self.monitor.shared.counters.record_block(self.block_size);
            sequence += 1;
        }
    }
}
