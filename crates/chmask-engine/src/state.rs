//! Global and per-channel mask flags shared between the frame path and the
//! control surface.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::MaskError;

#[derive(Debug)]
struct Flags {
    global_enable: bool,
    channel_masked: Vec<bool>,
}

/// Point-in-time copy of the flags, taken under the lock in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSnapshot {
    pub global_enable: bool,
    pub channel_masked: Arc<[bool]>,
}

impl MaskSnapshot {
    /// Indices of the masked channels, ascending.
    pub fn masked_channels(&self) -> Vec<usize> {
        self.channel_masked
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }
}

/// Channel count is fixed at construction. Masking starts disabled with no
/// channel masked.
#[derive(Debug)]
pub struct ChannelMaskState {
    num_channels: usize,
    flags: Mutex<Flags>,
}

impl ChannelMaskState {
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            flags: Mutex::new(Flags {
                global_enable: false,
                channel_masked: vec![false; num_channels],
            }),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn set_global_enable(&self, enable: bool) {
        self.flags.lock().global_enable = enable;
    }

    pub fn global_enable(&self) -> bool {
        self.flags.lock().global_enable
    }

    pub fn set_channel_masked(&self, index: usize, masked: bool) -> Result<(), MaskError> {
        let mut flags = self.flags.lock();
        let slot = flags
            .channel_masked
            .get_mut(index)
            .ok_or(MaskError::InvalidChannelIndex { index, channels: self.num_channels })?;
        *slot = masked;
        Ok(())
    }

    pub fn is_masked(&self, index: usize) -> Result<bool, MaskError> {
        self.flags
            .lock()
            .channel_masked
            .get(index)
            .copied()
            .ok_or(MaskError::InvalidChannelIndex { index, channels: self.num_channels })
    }

    pub fn snapshot(&self) -> MaskSnapshot {
        let flags = self.flags.lock();
        MaskSnapshot {
            global_enable: flags.global_enable,
            channel_masked: flags.channel_masked.as_slice().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled_and_unmasked() {
        let state = ChannelMaskState::new(3);
        let snap = state.snapshot();
        assert!(!snap.global_enable);
        assert_eq!(&*snap.channel_masked, &[false, false, false]);
        assert!(snap.masked_channels().is_empty());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let state = ChannelMaskState::new(2);
        assert!(matches!(
            state.set_channel_masked(2, true),
            Err(MaskError::InvalidChannelIndex { index: 2, channels: 2 })
        ));
        assert!(state.is_masked(5).is_err());
        assert!(state.snapshot().masked_channels().is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let state = ChannelMaskState::new(4);
        state.set_global_enable(true);
        state.set_channel_masked(1, true).unwrap();
        state.set_channel_masked(3, true).unwrap();
        let snap = state.snapshot();
        state.set_channel_masked(1, false).unwrap();
        state.set_global_enable(false);
        assert!(snap.global_enable);
        assert_eq!(snap.masked_channels(), vec![1, 3]);
        assert_eq!(state.snapshot().masked_channels(), vec![3]);
    }

    #[test]
    fn toggle_round_trip_leaves_no_residue() {
        let state = ChannelMaskState::new(2);
        let before = state.snapshot();
        state.set_channel_masked(0, true).unwrap();
        state.set_channel_masked(0, false).unwrap();
        assert_eq!(state.snapshot(), before);
    }
}
