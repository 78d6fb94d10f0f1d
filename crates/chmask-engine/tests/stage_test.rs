//! Frame-path tests for the channel-mask stage.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use chmask_engine::{
    DataType, Frame, FrameData, FrameOutcome, FramePool, MaskError, MaskStage, PoolError,
};
use chmask_params::ParamRegistry;
use parking_lot::Mutex;
use proptest::prelude::*;

fn stage_with_pool(channels: usize, pool: FramePool) -> (MaskStage, Receiver<Arc<Frame>>) {
    let mut registry = ParamRegistry::new();
    let (tx, rx) = mpsc::channel();
    let stage = MaskStage::new("MASK1", channels, &mut registry, pool, Arc::new(tx)).unwrap();
    (stage, rx)
}

fn stage(channels: usize) -> (MaskStage, Receiver<Arc<Frame>>) {
    stage_with_pool(channels, FramePool::unlimited())
}

fn configure(stage: &MaskStage, enable: bool, masked: &[bool]) {
    stage.on_config_write(stage.use_param(), i32::from(enable)).unwrap();
    for (i, &m) in masked.iter().enumerate() {
        let param = stage.channel_param(i).unwrap();
        stage.on_config_write(param, if m { 0 } else { 1 }).unwrap();
    }
}

#[test]
fn two_channel_int32_example() {
    let (stage, rx) = stage(2);
    configure(&stage, true, &[false, true]);

    let input = Arc::new(Frame::new(4, 2, vec![1i32, 2, 3, 4, 5, 6, 7, 8]).unwrap());
    assert_eq!(stage.on_frame(input.clone()).unwrap(), FrameOutcome::Masked);

    let out = rx.recv().unwrap();
    let FrameData::Int32(data) = out.data() else { panic!("expected int32 output") };
    assert_eq!(data, &[1, 2, 3, 4, 0, 0, 0, 0]);

    // The upstream frame is untouched.
    let FrameData::Int32(original) = input.data() else { panic!("expected int32 input") };
    assert_eq!(original, &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn every_kind_through_the_stage() {
    let (stage, rx) = stage(2);
    configure(&stage, true, &[true, false]);

    for kind in DataType::ALL {
        let bytes: Vec<u8> = (0..8 * kind.size()).map(|i| (i % 7 + 1) as u8).collect();
        let input = Arc::new(Frame::from_bytes(kind.code(), 4, 2, &bytes).unwrap());
        assert_eq!(stage.on_frame(input.clone()).unwrap(), FrameOutcome::Masked, "{kind}");

        let out = rx.recv().unwrap();
        let half = 4 * kind.size();
        assert!(out.as_bytes()[..half].iter().all(|&b| b == 0), "{kind}");
        assert_eq!(&out.as_bytes()[half..], &bytes[half..], "{kind}");
    }
    assert_eq!(stage.stats().masked, 10);
}

#[test]
fn unsupported_type_is_published_unmasked() {
    let (stage, rx) = stage(2);
    configure(&stage, true, &[true, true]);

    let input = Arc::new(Frame::from_bytes(99, 2, 2, &[1, 2, 3, 4]).unwrap());
    assert_eq!(stage.on_frame(input.clone()).unwrap(), FrameOutcome::Unsupported);

    let out = rx.recv().unwrap();
    assert_eq!(out.as_bytes(), input.as_bytes());
    assert_eq!(out.type_code(), 99);
    assert_eq!(stage.stats().unsupported, 1);
}

#[test]
fn pool_exhaustion_propagates_and_publishes_nothing() {
    let (stage, rx) = stage_with_pool(1, FramePool::new(Some(1), None));
    configure(&stage, true, &[true]);
    let input = Arc::new(Frame::new(2, 1, vec![1u8, 2]).unwrap());

    stage.on_frame(input.clone()).unwrap();
    let held = rx.recv().unwrap();

    let err = stage.on_frame(input.clone()).unwrap_err();
    assert!(matches!(err, MaskError::Pool(PoolError::BufferLimit { max: 1 })));
    assert!(rx.try_recv().is_err());

    drop(held);
    assert_eq!(stage.on_frame(input).unwrap(), FrameOutcome::Masked);
}

#[test]
fn write_before_frame_is_visible_to_that_frame() {
    let (stage, rx) = stage(2);
    configure(&stage, true, &[false, false]);
    let input = Arc::new(Frame::new(1, 2, vec![3.0f32, 4.0]).unwrap());

    stage.on_frame(input.clone()).unwrap();
    assert_eq!(rx.recv().unwrap().channel_bytes(0), Some(&3.0f32.to_ne_bytes()[..]));

    stage.on_config_write(stage.channel_param(0).unwrap(), 0).unwrap();
    stage.on_frame(input).unwrap();
    assert_eq!(rx.recv().unwrap().channel_bytes(0), Some(&[0u8; 4][..]));
}

#[test]
fn config_write_completes_while_a_frame_is_being_masked() {
    const WIDTH: usize = 16 << 20;

    let pool = FramePool::unlimited();
    let (stage, rx) = stage_with_pool(2, pool.clone());
    configure(&stage, true, &[true, true]);
    let input = Arc::new(Frame::new(WIDTH, 2, vec![7u8; 2 * WIDTH]).unwrap());
    let log = Mutex::new(Vec::new());

    thread::scope(|s| {
        s.spawn(|| {
            // The copy is leased before the port lock is released.
            while pool.buffers_in_use() == 0 {
                std::hint::spin_loop();
            }
            stage.on_config_write(stage.channel_param(0).unwrap(), 1).unwrap();
            log.lock().push("write");
        });
        stage.on_frame(input.clone()).unwrap();
        log.lock().push("frame");
    });

    assert_eq!(log.into_inner(), ["write", "frame"]);
    // The in-flight frame kept the flags it started with.
    let out = rx.recv().unwrap();
    assert!(out.as_bytes()[..WIDTH].iter().all(|&b| b == 0));
    assert!(!stage.state().is_masked(0).unwrap());
}

#[test]
fn concurrent_writes_never_tear_a_frame() {
    const CHANNELS: usize = 4;
    const WIDTH: usize = 64;
    const FRAMES: usize = 200;

    let (stage, rx) = stage(CHANNELS);
    configure(&stage, true, &[false; CHANNELS]);
    let data: Vec<u16> = (1..=(CHANNELS * WIDTH) as u16).collect();
    let input = Arc::new(Frame::new(WIDTH, CHANNELS, data).unwrap());

    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..2_000usize {
                let channel = round % CHANNELS;
                let param = stage.channel_param(channel).unwrap();
                stage.on_config_write(param, (round / CHANNELS % 2) as i32).unwrap();
            }
        });
        for _ in 0..FRAMES {
            stage.on_frame(input.clone()).unwrap();
        }
    });

    for _ in 0..FRAMES {
        let out = rx.recv().unwrap();
        for ch in 0..CHANNELS {
            let got = out.channel_bytes(ch).unwrap();
            let want = input.channel_bytes(ch).unwrap();
            assert!(
                got == want || got.iter().all(|&b| b == 0),
                "channel {ch} partially masked: {got:?}"
            );
        }
    }

    // The writer's last round for each channel wrote value 1.
    for ch in 0..CHANNELS {
        assert!(!stage.state().is_masked(ch).unwrap());
    }
}

proptest! {
    #[test]
    fn disabled_stage_is_identity(
        width in 1usize..8,
        height in 1usize..6,
        seed in any::<i64>(),
        masked in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let (stage, rx) = stage(height);
        configure(&stage, false, &masked[..height]);
        let data: Vec<i64> = (0..width * height).map(|i| seed.wrapping_add(i as i64)).collect();
        let input = Arc::new(Frame::new(width, height, data).unwrap());

        prop_assert_eq!(stage.on_frame(input.clone()).unwrap(), FrameOutcome::Passthrough);
        let out = rx.recv().unwrap();
        prop_assert!(Arc::ptr_eq(&out, &input));
    }

    #[test]
    fn masked_channels_zero_and_others_untouched(
        width in 1usize..8,
        height in 1usize..6,
        data in proptest::collection::vec(1u32..u32::MAX, 48),
        masked in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let (stage, rx) = stage(height);
        configure(&stage, true, &masked[..height]);
        let input = Arc::new(Frame::new(width, height, data[..width * height].to_vec()).unwrap());

        stage.on_frame(input.clone()).unwrap();
        let out = rx.recv().unwrap();
        for ch in 0..height {
            let got = out.channel_bytes(ch).unwrap();
            if masked[ch] {
                prop_assert!(got.iter().all(|&b| b == 0));
            } else {
                prop_assert_eq!(got, input.channel_bytes(ch).unwrap());
            }
        }
    }
}
