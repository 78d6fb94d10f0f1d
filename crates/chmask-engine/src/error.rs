use chmask_params::{ParamError, ParamId};
use thiserror::Error;

use crate::pool::PoolError;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("channel index {index} out of range (0..{channels})")]
    InvalidChannelIndex { index: usize, channels: usize },
    #[error("unsupported element type code {0}")]
    UnsupportedElementType(u32),
    #[error("frame has {found} channels, stage is configured for {expected}")]
    ChannelCountMismatch { expected: usize, found: usize },
    #[error("parameter {0} is not handled by this stage")]
    UnknownParameter(ParamId),
    #[error("frame geometry {width}x{height} does not match {len} elements")]
    BadGeometry { width: usize, height: usize, len: usize },
    #[error("raw data tagged with known element type code {0}")]
    MislabelledRaw(u32),
    #[error(transparent)]
    Host(#[from] ParamError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}
