use std::sync::Arc;

use chmask_params::{ParamError, ParamId};

use crate::error::MaskError;
use crate::frame::Frame;

/// Hooks the host calls on a processing stage.
/// - `process_frame` is called with one frame at a time.
/// - `write_int32`/`read_int32` may be called from any thread, including
///   while `process_frame` is running.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn process_frame(&self, frame: Arc<Frame>) -> Result<FrameOutcome, MaskError>;
    fn write_int32(&self, param: ParamId, value: i32) -> Result<(), MaskError>;
    fn read_int32(&self, param: ParamId) -> Result<i32, MaskError>;
}

/// What happened to a delivered frame. Every variant means a frame was
/// published downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Masking disabled; the original was forwarded without copying.
    Passthrough,
    /// A copy was masked and published.
    Masked,
    /// Unknown element type; the copy was published unmasked.
    Unsupported,
    /// Channel count did not match; the original was forwarded.
    Mismatched,
}

/// Parameters that belong to whoever hosts the stage. The stage forwards
/// writes and reads of ids it does not own here.
pub trait ParamHost: Send + Sync {
    fn write_int32(&self, param: ParamId, value: i32) -> Result<(), ParamError>;
    fn read_int32(&self, param: ParamId) -> Result<i32, ParamError>;
}
