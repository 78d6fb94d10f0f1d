pub mod config;
pub mod dsp;
pub mod error;
pub mod frame;
pub mod plugin;
pub mod pool;
pub mod sink;
pub mod stage;
pub mod state;

use anyhow::{bail, Context, Result};
use chmask_params::{ParamError, ParamId, ParamRegistry};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub use config::{ConfigError, StageConfig};
pub use error::MaskError;
pub use frame::{DataType, Frame, FrameData};
pub use plugin::{FrameOutcome, ParamHost, Plugin};
pub use pool::{FramePool, PoolError};
pub use sink::FrameSink;
pub use stage::{MaskStage, StageStats};
pub use state::{ChannelMaskState, MaskSnapshot};

pub const ENABLE_CALLBACKS: &str = "EnableCallbacks";
pub const BLOCKING_CALLBACKS: &str = "BlockingCallbacks";
pub const QUEUE_SIZE: &str = "QueueSize";
pub const DROPPED_ARRAYS: &str = "DroppedArrays";
pub const ARRAY_COUNTER: &str = "ArrayCounter";

/* ---------- host-owned parameters ---------- */

/// Parameters of the hosting framework. The stage forwards every id it does
/// not own here.
#[derive(Debug)]
pub struct BaseParams {
    enable_callbacks: ParamId,
    blocking_callbacks: ParamId,
    queue_size: ParamId,
    dropped_arrays: ParamId,
    array_counter: ParamId,
    callbacks: AtomicBool,
    counter: AtomicI32,
    dropped: AtomicI32,
    blocking: bool,
    queue: usize,
}

impl BaseParams {
    pub fn register(registry: &mut ParamRegistry, cfg: &StageConfig) -> Result<Self, ParamError> {
        Ok(Self {
            enable_callbacks: registry.create(ENABLE_CALLBACKS)?,
            blocking_callbacks: registry.create(BLOCKING_CALLBACKS)?,
            queue_size: registry.create(QUEUE_SIZE)?,
            dropped_arrays: registry.create(DROPPED_ARRAYS)?,
            array_counter: registry.create(ARRAY_COUNTER)?,
            callbacks: AtomicBool::new(true),
            counter: AtomicI32::new(0),
            dropped: AtomicI32::new(0),
            blocking: cfg.blocking_callbacks,
            queue: cfg.queue_size,
        })
    }

    pub fn callbacks_enabled(&self) -> bool {
        self.callbacks.load(Ordering::Acquire)
    }

    pub fn array_counter(&self) -> i32 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn dropped_arrays(&self) -> i32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn count_processed(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    fn count_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl ParamHost for BaseParams {
    fn write_int32(&self, param: ParamId, value: i32) -> Result<(), ParamError> {
        if param == self.enable_callbacks {
            self.callbacks.store(value != 0, Ordering::Release);
            tracing::info!(value, "enable callbacks written");
            Ok(())
        } else if param == self.array_counter {
            self.counter.store(value, Ordering::Relaxed);
            Ok(())
        } else if param == self.blocking_callbacks {
            Err(ParamError::ReadOnly(BLOCKING_CALLBACKS.to_string()))
        } else if param == self.queue_size {
            Err(ParamError::ReadOnly(QUEUE_SIZE.to_string()))
        } else if param == self.dropped_arrays {
            Err(ParamError::ReadOnly(DROPPED_ARRAYS.to_string()))
        } else {
            Err(ParamError::Unknown(param))
        }
    }

    fn read_int32(&self, param: ParamId) -> Result<i32, ParamError> {
        if param == self.enable_callbacks {
            Ok(i32::from(self.callbacks_enabled()))
        } else if param == self.blocking_callbacks {
            Ok(i32::from(self.blocking))
        } else if param == self.queue_size {
            Ok(i32::try_from(self.queue).unwrap_or(i32::MAX))
        } else if param == self.dropped_arrays {
            Ok(self.dropped_arrays())
        } else if param == self.array_counter {
            Ok(self.array_counter())
        } else {
            Err(ParamError::Unknown(param))
        }
    }
}

/* ---------- host: frame delivery ---------- */

/// What the host did with a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed on the caller's thread (blocking callbacks).
    Processed(FrameOutcome),
    /// Handed to the worker thread.
    Queued,
    /// Queue was full.
    Dropped,
    /// `EnableCallbacks` is 0.
    Disabled,
}

/// Delivers frames to one plugin, either inline or through a bounded queue
/// drained by a single worker thread.
pub struct Host {
    cfg: StageConfig,
    plugin: Arc<dyn Plugin>,
    params: Arc<BaseParams>,
    started: bool,
    tx: Option<SyncSender<Arc<Frame>>>,
    worker: Option<JoinHandle<()>>,
}

impl Host {
    pub fn new(cfg: StageConfig, plugin: Arc<dyn Plugin>, params: Arc<BaseParams>) -> Self {
        Self { cfg, plugin, params, started: false, tx: None, worker: None }
    }

    pub fn config(&self) -> &StageConfig {
        &self.cfg
    }

    pub fn params(&self) -> &Arc<BaseParams> {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.cfg.max_threads > 1 {
            tracing::warn!(
                requested = self.cfg.max_threads,
                "stage processes one frame at a time; using a single worker"
            );
        }
        if self.cfg.priority != 0 {
            tracing::debug!(priority = self.cfg.priority, "thread priority hint ignored");
        }

        if !self.cfg.blocking_callbacks {
            let (tx, rx) = mpsc::sync_channel::<Arc<Frame>>(self.cfg.queue_size);
            let plugin = self.plugin.clone();
            let params = self.params.clone();
            let mut builder = thread::Builder::new().name(format!("{}-worker", self.cfg.name));
            if self.cfg.stack_size > 0 {
                builder = builder.stack_size(self.cfg.stack_size);
            }
            let worker = builder
                .spawn(move || {
                    for frame in rx {
                        run_plugin(plugin.as_ref(), &params, frame);
                    }
                })
                .context("Failed to spawn worker thread")?;
            self.tx = Some(tx);
            self.worker = Some(worker);
        }

        self.started = true;
        tracing::info!(
            stage = %self.cfg.name,
            source = %self.cfg.source_port,
            addr = self.cfg.source_addr,
            blocking = self.cfg.blocking_callbacks,
            queue = self.cfg.queue_size,
            "host started"
        );
        Ok(())
    }

    pub fn deliver(&self, frame: Arc<Frame>) -> Result<Delivery> {
        if !self.started {
            bail!("host `{}` is not running", self.cfg.name);
        }
        if !self.params.callbacks_enabled() {
            return Ok(Delivery::Disabled);
        }
        if self.cfg.blocking_callbacks {
            let outcome = self
                .plugin
                .process_frame(frame)
                .with_context(|| format!("stage `{}` failed to process frame", self.cfg.name))?;
            self.params.count_processed();
            return Ok(Delivery::Processed(outcome));
        }

        let tx = self.tx.as_ref().context("worker queue missing")?;
        match tx.try_send(frame) {
            Ok(()) => Ok(Delivery::Queued),
            Err(TrySendError::Full(f)) => {
                self.params.count_dropped();
                tracing::warn!(stage = %self.cfg.name, unique_id = f.unique_id(), "queue full, frame dropped");
                Ok(Delivery::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => bail!("worker thread for `{}` has exited", self.cfg.name),
        }
    }

    /// Drains queued frames, then joins the worker.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(stage = %self.cfg.name, "worker thread panicked");
            }
        }
        if self.started {
            tracing::info!(stage = %self.cfg.name, "host stopped");
        }
        self.started = false;
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_plugin(plugin: &dyn Plugin, params: &BaseParams, frame: Arc<Frame>) {
    match plugin.process_frame(frame) {
        Ok(_) => params.count_processed(),
        Err(err) => tracing::error!(stage = plugin.name(), "frame processing failed: {err}"),
    }
}

/* ---------- instantiation ---------- */

/// A configured, running stage plus the registry that names its parameters.
pub struct Instance {
    pub host: Host,
    pub stage: Arc<MaskStage>,
    pub registry: ParamRegistry,
}

impl Instance {
    pub fn param(&self, name: &str) -> Result<ParamId> {
        self.registry
            .find(name)
            .with_context(|| format!("no parameter named `{name}`"))
    }

    pub fn write(&self, name: &str, value: i32) -> Result<()> {
        let id = self.param(name)?;
        self.stage
            .on_config_write(id, value)
            .with_context(|| format!("writing {name}={value}"))
    }

    pub fn read(&self, name: &str) -> Result<i32> {
        let id = self.param(name)?;
        Ok(self.stage.read_param(id)?)
    }
}

/// Builds and starts one stage instance from its construction parameters.
pub fn configure(cfg: StageConfig, sink: Arc<dyn FrameSink>) -> Result<Instance> {
    cfg.validate().context("Invalid stage configuration")?;

    let mut registry = ParamRegistry::new();
    let params = Arc::new(BaseParams::register(&mut registry, &cfg)?);
    let pool = FramePool::new(cfg.max_buffers, cfg.max_memory);
    let stage = MaskStage::new(cfg.name.clone(), cfg.num_channels, &mut registry, pool, sink)?
        .with_param_host(params.clone());
    let stage = Arc::new(stage);

    let mut host = Host::new(cfg, stage.clone(), params);
    host.start()?;
    Ok(Instance { host, stage, registry })
}
