use std::sync::{mpsc, Arc};

use anyhow::{bail, Context, Result};
use chmask_engine::{configure, DataType, Frame, StageConfig};
use chmask_params::{channel_enable_name, parse_channel_enable, Assignment, USE_MASK};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chmask", version, about = "Channel-mask frame stage")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the parameters an instance with CHANNELS channels exposes
    Params { channels: usize },
    /// Bring up one instance, apply writes, push synthetic frames through it
    Configure(ConfigureArgs),
}

#[derive(Args)]
struct ConfigureArgs {
    /// Stage (port) name
    name: String,
    /// Number of channels
    channels: usize,
    /// Max queue size
    queue_size: usize,
    /// Blocking callbacks (0 = queued, else inline)
    blocking: i32,
    /// Upstream source port
    source_port: String,
    /// Upstream source address
    #[arg(allow_negative_numbers = true)]
    source_addr: i32,
    /// Max buffers (<= 0 = unlimited)
    #[arg(allow_negative_numbers = true)]
    max_buffers: i64,
    /// Max memory in bytes (<= 0 = unlimited)
    #[arg(allow_negative_numbers = true)]
    max_memory: i64,
    /// Thread priority
    #[arg(allow_negative_numbers = true)]
    priority: i32,
    /// Thread stack size (0 = default)
    stack_size: usize,
    /// Max threads
    max_threads: usize,

    /// Parameter write applied before any frame, e.g. `USE=1` or `CH2Enable=0`
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<Assignment>,
    /// Synthetic frames to deliver
    #[arg(long, default_value_t = 1)]
    frames: u64,
    /// Samples per channel
    #[arg(long, default_value_t = 8)]
    width: usize,
    /// Element type of the synthetic frames
    #[arg(long, default_value = "int32")]
    dtype: DataType,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Params { channels } => {
            println!("{USE_MASK:<12} mask on/off (1 = on)");
            for i in 0..channels {
                println!("{:<12} channel {} (1 = pass, 0 = mask)", channel_enable_name(i), i + 1);
            }
        }
        Command::Configure(args) => run(args)?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: ConfigureArgs) -> Result<()> {
    let cfg = StageConfig {
        name: args.name,
        num_channels: args.channels,
        queue_size: args.queue_size,
        blocking_callbacks: args.blocking != 0,
        source_port: args.source_port,
        source_addr: args.source_addr,
        max_buffers: StageConfig::limit(args.max_buffers),
        max_memory: StageConfig::limit(args.max_memory),
        priority: args.priority,
        stack_size: args.stack_size,
        max_threads: args.max_threads,
    };

    let (tx, rx) = mpsc::channel::<Arc<Frame>>();
    let mut instance = configure(cfg, Arc::new(tx))?;

    let channels = instance.stage.state().num_channels();
    for write in &args.set {
        if let Some(index) = parse_channel_enable(&write.name) {
            if index >= channels {
                bail!("`{write}` addresses channel {} but `{}` has {channels}", index + 1, instance.host.config().name);
            }
        }
        instance.write(&write.name, write.value)?;
    }

    tracing::info!(frames = args.frames, width = args.width, dtype = %args.dtype, "delivering synthetic frames");
    for id in 0..args.frames {
        let frame = ramp_frame(args.dtype, args.width, channels, id)?;
        instance.host.deliver(Arc::new(frame))?;
    }
    instance.host.stop();

    for frame in rx.try_iter() {
        let channels: Vec<String> = (0..frame.height())
            .map(|ch| {
                let zeroed = frame.channel_bytes(ch).is_some_and(|b| b.iter().all(|&x| x == 0));
                format!("ch{}={}", ch + 1, if zeroed { "zeroed" } else { "kept" })
            })
            .collect();
        println!("frame {:>4}: {}", frame.unique_id(), channels.join(" "));
    }

    let stats = instance.stage.stats();
    println!(
        "received={} masked={} passthrough={} unsupported={} mismatched={} dropped={}",
        stats.received,
        stats.masked,
        stats.passthrough,
        stats.unsupported,
        stats.mismatched,
        instance.host.params().dropped_arrays(),
    );
    Ok(())
}

/// Element `k` holds `k % 100 + 1`, which fits every kind.
fn ramp_frame(dtype: DataType, width: usize, channels: usize, id: u64) -> Result<Frame> {
    let n = width * channels;
    macro_rules! ramp {
        ($t:ty) => {
            Frame::new(width, channels, (0..n).map(|k| (k % 100 + 1) as $t).collect::<Vec<$t>>())
        };
    }
    let frame = match dtype {
        DataType::Int8 => ramp!(i8),
        DataType::UInt8 => ramp!(u8),
        DataType::Int16 => ramp!(i16),
        DataType::UInt16 => ramp!(u16),
        DataType::Int32 => ramp!(i32),
        DataType::UInt32 => ramp!(u32),
        DataType::Int64 => ramp!(i64),
        DataType::UInt64 => ramp!(u64),
        DataType::Float32 => ramp!(f32),
        DataType::Float64 => ramp!(f64),
    }
    .context("Failed to build synthetic frame")?;
    Ok(frame.with_unique_id(id))
}
