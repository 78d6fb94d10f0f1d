//! Zero-fill of masked channels.

use crate::error::MaskError;
use crate::frame::{Element, Frame, FrameData};

/// Zeroes every channel listed in `masked` in place.
///
/// Channel `i` spans elements `width * i .. width * (i + 1)`. Indices are
/// validated before anything is written, and raw frames of an unknown element
/// type are rejected, so on error the frame is left exactly as it was.
pub fn apply(frame: &mut Frame, masked: &[usize]) -> Result<(), MaskError> {
    let (width, height) = (frame.width(), frame.height());
    if let Some(&index) = masked.iter().find(|&&i| i >= height) {
        return Err(MaskError::InvalidChannelIndex { index, channels: height });
    }
    match frame.data_mut() {
        FrameData::Int8(d) => zero_channels(d, width, masked),
        FrameData::UInt8(d) => zero_channels(d, width, masked),
        FrameData::Int16(d) => zero_channels(d, width, masked),
        FrameData::UInt16(d) => zero_channels(d, width, masked),
        FrameData::Int32(d) => zero_channels(d, width, masked),
        FrameData::UInt32(d) => zero_channels(d, width, masked),
        FrameData::Int64(d) => zero_channels(d, width, masked),
        FrameData::UInt64(d) => zero_channels(d, width, masked),
        FrameData::Float32(d) => zero_channels(d, width, masked),
        FrameData::Float64(d) => zero_channels(d, width, masked),
        FrameData::Raw { type_code, .. } => {
            return Err(MaskError::UnsupportedElementType(*type_code))
        }
    }
    Ok(())
}

fn zero_channels<T: Element>(data: &mut [T], width: usize, masked: &[usize]) {
    for &channel in masked {
        let start = channel * width;
        if let Some(span) = data.get_mut(start..start + width) {
            span.fill(T::default());
        }
    }
}
