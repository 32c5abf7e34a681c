//! Acquisition engine
//!
//! Given an open and configured front end, the engine runs a dedicated
//! worker thread that refills the hardware ring buffer, converts the samples
//! and publishes them into a bounded output channel.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Starting ──first refill──▶ Streaming ──stop──▶ Stopping ──▶ Idle
//!                    │                           │
//!                    └── setup failure ──▶ Idle  └── fault / consumer gone ──▶ Idle
//! ```
//!
//! `start` returns once the worker is live; `stop` returns once the worker
//! has exited and the channels and buffer are released. Health flags and
//! counters are atomics shared with the worker; nothing inside the loop
//! takes a lock.
//!
//! # Example
//!
//! ```ignore
//! use plutoacq_rs::engine::{output_channel, AcquisitionEngine};
//!
//! let (tx, rx) = output_channel(16);
//! let mut engine = AcquisitionEngine::new();
//! engine.start(session.link().unwrap(), session.config(), &settings, tx)?;
//!
//! while let Some(block) = rx.recv() {
//!     process(&block.data);
//! }
//! ```

pub mod convert;
pub mod output;
mod worker;

pub use convert::{convert_block, convert_i16, convert_i8};
pub use output::{output_channel, BlockReceiver, BlockSender, IqBlock, DEFAULT_CHANNEL_DEPTH};

use crate::backend::iio_trait::IioDevice;
use crate::backend::registers;
use crate::backend::session::{LinkHandle, SessionConfig};
use crate::config::StreamSettings;
use crate::error::{AcqError, Result};
use crate::types::{EngineState, HealthSnapshot};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use worker::{HealthMonitor, StreamResources, StreamWorker};

// ==================== Buffer Plan ====================

/// Block and kernel-buffer sizing for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    /// Samples per refill
    pub block_size: usize,
    /// Kernel-side buffers queued for pipelined refill
    pub kernel_buffers: usize,
}

impl BufferPlan {
    /// Size blocks to at most 50 ms of samples, capped at `max_block`, and
    /// queue as many kernel buffers as the sample budget allows.
    pub fn new(max_block: usize, sample_rate: u32, budget: usize, max_buffers: usize) -> Self {
        let block_size = max_block.min(sample_rate as usize / 20).max(1);
        let kernel_buffers = max_buffers.min(budget / block_size).max(1);
        Self {
            block_size,
            kernel_buffers,
        }
    }

    pub fn from_settings(settings: &StreamSettings, sample_rate: u32) -> Self {
        Self::new(
            settings.block_size,
            sample_rate,
            settings.kernel_buffer_budget,
            settings.max_kernel_buffers,
        )
    }
}

// ==================== Shared State ====================

/// Health flags written by the worker, read by anyone
#[derive(Debug, Default)]
pub struct HealthFlags {
    underflow: AtomicBool,
    overgain: AtomicBool,
}

impl HealthFlags {
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            underflow: self.underflow.load(Ordering::Acquire),
            overgain: self.overgain.load(Ordering::Acquire),
        }
    }

    /// Set the underflow flag, returning the previous value
    pub fn set_underflow(&self, value: bool) -> bool {
        self.underflow.swap(value, Ordering::AcqRel)
    }

    /// Set the overgain flag, returning the previous value
    pub fn set_overgain(&self, value: bool) -> bool {
        self.overgain.swap(value, Ordering::AcqRel)
    }

    pub fn reset(&self) {
        self.underflow.store(false, Ordering::Release);
        self.overgain.store(false, Ordering::Release);
    }
}

/// Counters kept by the worker
#[derive(Debug, Default)]
pub struct EngineCounters {
    refills: AtomicU64,
    blocks: AtomicU64,
    samples: AtomicU64,
    underflows: AtomicU64,
    overgains: AtomicU64,
}

impl EngineCounters {
    fn record_refill(&self) {
        self.refills.fetch_add(1, Ordering::Relaxed);
    }

    fn record_block(&self, samples: usize) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
    }

    fn record_overgain(&self) {
        self.overgains.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.refills,
            &self.blocks,
            &self.samples,
            &self.underflows,
            &self.overgains,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            refills: self.refills.load(Ordering::Relaxed),
            blocks_published: self.blocks.load(Ordering::Relaxed),
            samples_published: self.samples.load(Ordering::Relaxed),
            underflow_events: self.underflows.load(Ordering::Relaxed),
            overgain_events: self.overgains.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Successful buffer refills
    pub refills: u64,
    /// Blocks handed to the consumer
    pub blocks_published: u64,
    /// Complex samples handed to the consumer
    pub samples_published: u64,
    /// Cycles that saw the underflow bit set
    pub underflow_events: u64,
    /// Cycles that saw gain overdrive
    pub overgain_events: u64,
}

/// State shared between the engine handle and its worker
#[derive(Debug, Default)]
pub(crate) struct EngineShared {
    state: AtomicU8,
    pub(crate) health: HealthFlags,
    pub(crate) counters: EngineCounters,
}

impl EngineShared {
    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

// ==================== Engine ====================

/// Why the worker ended
#[derive(Debug)]
pub enum StreamExit {
    /// Stopped on request
    Stopped,
    /// The consumer dropped its end of the output channel
    ConsumerClosed,
    /// The stream failed and was not retried
    Fault(AcqError),
}

impl StreamExit {
    pub fn is_fault(&self) -> bool {
        matches!(self, StreamExit::Fault(_))
    }
}

struct RunningWorker {
    /// Dropping this wakes the worker
    stop_tx: Sender<()>,
    handle: JoinHandle<StreamExit>,
}

/// Runs the acquisition loop on a dedicated thread
#[derive(Default)]
pub struct AcquisitionEngine {
    shared: Arc<EngineShared>,
    running: Option<RunningWorker>,
}

impl AcquisitionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Latest health flags (kept after the worker exits)
    pub fn health(&self) -> HealthSnapshot {
        self.shared.health.snapshot()
    }

    /// Counters of the current or last run
    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Whether a worker is alive
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Start streaming from a configured link
    ///
    /// Acquires the sample rails, sizes and creates the capture buffer, then
    /// spawns the worker and waits for it to come up. Starting while a
    /// worker is alive does nothing. On failure every acquired resource is
    /// released and the engine is back in `Idle`.
    pub fn start(
        &mut self,
        link: &LinkHandle,
        config: &SessionConfig,
        settings: &StreamSettings,
        output: BlockSender,
    ) -> Result<()> {
        if self.is_running() {
            tracing::debug!("Acquisition already running, ignoring start");
            return Ok(());
        }
        if let Some(exit) = self.poll_exit() {
            tracing::debug!("Reaped previous worker: {:?}", exit);
        }

        self.shared.set_state(EngineState::Starting);
        self.shared.health.reset();
        self.shared.counters.reset();

        match self.spawn_worker(link, config, settings, output) {
            Ok(worker) => {
                self.running = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(EngineState::Idle);
                tracing::error!("Failed to start acquisition: {}", e);
                Err(e)
            }
        }
    }

    fn spawn_worker(
        &self,
        link: &LinkHandle,
        config: &SessionConfig,
        settings: &StreamSettings,
        output: BlockSender,
    ) -> Result<RunningWorker> {
        let route = link.route(config.rf_port);
        let stream = link.stream_device().clone();
        let phy = link.phy().clone();
        let plan = BufferPlan::from_settings(settings, config.sample_rate);

        let i_channel = stream.find_channel(route.i_channel, false);
        let q_channel = stream.find_channel(route.q_channel, false);
        let (Some(i_channel), Some(q_channel)) = (i_channel, q_channel) else {
            return Err(AcqError::ChannelAcquisition(format!(
                "Failed to acquire RX channels {}/{}",
                route.i_channel, route.q_channel
            )));
        };

        let mut resources = StreamResources::enable(i_channel, q_channel, config.sample_format);

        stream
            .set_kernel_buffers_count(plan.kernel_buffers)
            .map_err(|e| AcqError::BufferAllocation(format!("kernel buffers: {}", e)))?;
        tracing::info!("Allocate {} kernel buffers", plan.kernel_buffers);
        tracing::info!("Allocate buffer size {}", plan.block_size);

        let buffer = stream
            .create_buffer(plan.block_size)
            .map_err(|e| AcqError::BufferAllocation(format!("Could not create RX buffer: {}", e)))?;
        resources.attach_buffer(buffer);

        reset_underflow(stream.as_ref());
        match stream.reg_read(registers::DECIMATION_REGISTER) {
            Ok(value) => tracing::info!("Decimation register: {}", value),
            Err(e) => tracing::debug!("Failed to read decimation register: {}", e),
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<()>(1);
        let worker = StreamWorker {
            resources,
            monitor: HealthMonitor {
                phy,
                stream,
                route,
                shared: self.shared.clone(),
            },
            format: config.sample_format,
            sample_rate: config.sample_rate,
            block_size: plan.block_size,
            output,
            stop_rx,
        };

        let handle = std::thread::Builder::new()
            .name("iq-acquisition".to_string())
            .spawn(move || worker.run(ready_tx))?;

        // The worker signals once it is live; a closed channel means it died first
        let _ = ready_rx.recv();

        Ok(RunningWorker { stop_tx, handle })
    }

    /// Stop the worker and wait for it to release the hardware
    ///
    /// Returns `None` when nothing was running; safe to call repeatedly.
    pub fn stop(&mut self) -> Option<StreamExit> {
        let worker = self.running.take()?;
        if !worker.handle.is_finished() {
            self.shared.set_state(EngineState::Stopping);
        }
        drop(worker.stop_tx);
        let exit = join_worker(worker.handle);
        self.shared.set_state(EngineState::Idle);
        Some(exit)
    }

    /// Collect the exit of a worker that ended on its own
    ///
    /// Returns `None` while the worker is alive or when none was started.
    pub fn poll_exit(&mut self) -> Option<StreamExit> {
        let finished = self
            .running
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished());
        if !finished {
            return None;
        }
        let worker = self.running.take()?;
        let exit = join_worker(worker.handle);
        self.shared.set_state(EngineState::Idle);
        Some(exit)
    }
}

impl std::fmt::Debug for AcquisitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionEngine")
            .field("state", &self.state())
            .field("health", &self.health())
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_worker(handle: JoinHandle<StreamExit>) -> StreamExit {
    handle.join().unwrap_or_else(|_| {
        StreamExit::Fault(AcqError::StreamFault("acquisition worker panicked".to_string()))
    })
}

/// Clear a stale underflow bit before streaming
fn reset_underflow(stream: &dyn IioDevice) {
    let result = stream
        .reg_read(registers::STREAM_STATUS)
        .and_then(|value| stream.reg_write(registers::STREAM_STATUS, value));
    if let Err(e) = result {
        tracing::warn!("Failed to reset underflow state: {}", e);
    }
}
