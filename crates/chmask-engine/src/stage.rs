//! The channel-mask stage.
//!
//! Two locks are involved. The port lock serialises frame bookkeeping,
//! publishing and parameter writes; the mask state has its own short lock for
//! the flags. They are always taken in that order. The port lock is released
//! while the copy is being masked so parameter writes never wait on a
//! transform, only on a publish.

use std::sync::Arc;

use chmask_params::{channel_enable_name, ParamId, ParamRegistry, USE_MASK};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::dsp::mask;
use crate::error::MaskError;
use crate::frame::Frame;
use crate::plugin::{FrameOutcome, ParamHost, Plugin};
use crate::pool::FramePool;
use crate::sink::FrameSink;
use crate::state::ChannelMaskState;

/// Enable value that means "on" for `USE` and "pass through" for `CH<n>Enable`.
const ENABLED: i32 = 1;

/// Per-stage frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub received: u64,
    pub passthrough: u64,
    pub masked: u64,
    pub unsupported: u64,
    pub mismatched: u64,
}

#[derive(Debug, Default)]
struct Port {
    stats: StageStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    UseMask,
    Channel(usize),
}

pub struct MaskStage {
    name: String,
    state: ChannelMaskState,
    use_param: ParamId,
    channel_params: Vec<ParamId>,
    port: Mutex<Port>,
    pool: FramePool,
    sink: Arc<dyn FrameSink>,
    host: Option<Arc<dyn ParamHost>>,
}

impl MaskStage {
    /// Registers `USE` and `CH1Enable..CH<num_channels>Enable` in `registry`.
    pub fn new(
        name: impl Into<String>,
        num_channels: usize,
        registry: &mut ParamRegistry,
        pool: FramePool,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self, MaskError> {
        let use_param = registry.create(USE_MASK)?;
        let channel_params = (0..num_channels)
            .map(|i| registry.create(&channel_enable_name(i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            state: ChannelMaskState::new(num_channels),
            use_param,
            channel_params,
            port: Mutex::new(Port::default()),
            pool,
            sink,
            host: None,
        })
    }

    /// Parameters this stage does not own are forwarded to `host`.
    pub fn with_param_host(mut self, host: Arc<dyn ParamHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn state(&self) -> &ChannelMaskState {
        &self.state
    }

    pub fn stats(&self) -> StageStats {
        self.port.lock().stats
    }

    pub fn use_param(&self) -> ParamId {
        self.use_param
    }

    pub fn channel_param(&self, index: usize) -> Option<ParamId> {
        self.channel_params.get(index).copied()
    }

    fn bind(&self, param: ParamId) -> Option<Binding> {
        if param == self.use_param {
            return Some(Binding::UseMask);
        }
        self.channel_params.iter().position(|&p| p == param).map(Binding::Channel)
    }

    pub fn on_frame(&self, frame: Arc<Frame>) -> Result<FrameOutcome, MaskError> {
        let mut port = self.port.lock();
        port.stats.received += 1;

        // Writers hold the port lock too, so the flag cannot change between
        // this read and the snapshot below.
        if !self.state.global_enable() {
            port.stats.passthrough += 1;
            self.sink.publish(frame);
            return Ok(FrameOutcome::Passthrough);
        }

        let expected = self.state.num_channels();
        if frame.height() != expected {
            let err = MaskError::ChannelCountMismatch { expected, found: frame.height() };
            warn!(stage = %self.name, unique_id = frame.unique_id(), "{err}; forwarding unmasked");
            port.stats.mismatched += 1;
            self.sink.publish(frame);
            return Ok(FrameOutcome::Mismatched);
        }

        let masked = self.state.snapshot().masked_channels();
        let mut copy = self.pool.copy(&frame).map_err(|err| {
            warn!(stage = %self.name, unique_id = frame.unique_id(), "frame copy failed: {err}");
            err
        })?;
        let result = MutexGuard::unlocked(&mut port, || mask::apply(&mut copy, &masked));

        let outcome = match result {
            Ok(()) => {
                port.stats.masked += 1;
                debug!(stage = %self.name, unique_id = copy.unique_id(), ?masked, "masked frame");
                FrameOutcome::Masked
            }
            Err(MaskError::UnsupportedElementType(code)) => {
                port.stats.unsupported += 1;
                warn!(stage = %self.name, unique_id = copy.unique_id(), code, "unsupported data type, publishing unmasked");
                FrameOutcome::Unsupported
            }
            Err(err) => return Err(err),
        };
        self.sink.publish(Arc::new(copy));
        Ok(outcome)
    }

    pub fn on_config_write(&self, param: ParamId, value: i32) -> Result<(), MaskError> {
        match self.bind(param) {
            Some(Binding::UseMask) => {
                let _port = self.port.lock();
                let enable = value == ENABLED;
                self.state.set_global_enable(enable);
                info!(stage = %self.name, value, enable, "use mask written");
                Ok(())
            }
            Some(Binding::Channel(index)) => {
                let _port = self.port.lock();
                let masked = value != ENABLED;
                self.state.set_channel_masked(index, masked)?;
                info!(stage = %self.name, channel = index + 1, value, masked, "channel enable written");
                Ok(())
            }
            None => match &self.host {
                Some(host) => Ok(host.write_int32(param, value)?),
                None => Err(MaskError::UnknownParameter(param)),
            },
        }
    }

    pub fn read_param(&self, param: ParamId) -> Result<i32, MaskError> {
        match self.bind(param) {
            Some(Binding::UseMask) => Ok(i32::from(self.state.global_enable())),
            Some(Binding::Channel(index)) => Ok(i32::from(!self.state.is_masked(index)?)),
            None => match &self.host {
                Some(host) => Ok(host.read_int32(param)?),
                None => Err(MaskError::UnknownParameter(param)),
            },
        }
    }
}

impl Plugin for MaskStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_frame(&self, frame: Arc<Frame>) -> Result<FrameOutcome, MaskError> {
        self.on_frame(frame)
    }

    fn write_int32(&self, param: ParamId, value: i32) -> Result<(), MaskError> {
        self.on_config_write(param, value)
    }

    fn read_int32(&self, param: ParamId) -> Result<i32, MaskError> {
        self.read_param(param)
    }
}
