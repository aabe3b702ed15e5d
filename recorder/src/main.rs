use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::ViewDesk;
use lightcore::processing::MappingFunction;
use lightcore::storage::DirectorySink;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::RecorderConfig;
use workflow::runner::Runner;
use workflow::viewer;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Light-intensity scanner recorder and batch viewer")]
struct Args {
    /// Load a recorder config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run the record/persist cycle until Ctrl+C
    #[arg(long, default_value_t = false)]
    record: bool,
    /// Drive a simulated scanner instead of the serial port
    #[arg(long, default_value_t = false)]
    simulate: bool,
    /// Print the stored batches
    #[arg(long, default_value_t = false)]
    list: bool,
    /// Open stored batches as views and print them against the shared range
    #[arg(long, num_args = 1..)]
    view: Vec<String>,
    /// Keep the HTTP bridge alive for external renderers
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud_rate: Option<u32>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    grid_step: Option<usize>,
    /// linear, sqrt or square
    #[arg(long)]
    mapping: Option<MappingFunction>,
    #[arg(long)]
    min_y: Option<u32>,
    #[arg(long)]
    max_y: Option<u32>,
    #[arg(long)]
    step: Option<u32>,
    #[arg(long)]
    initial_delay_secs: Option<u64>,
    #[arg(long)]
    record_secs: Option<u64>,
    #[arg(long)]
    cycle_delay_secs: Option<u64>,
    #[arg(long)]
    bridge_address: Option<SocketAddr>,
}

impl Args {
    fn apply(&self, config: &mut RecorderConfig) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(grid_step) = self.grid_step {
            config.grid_step = grid_step;
        }
        if let Some(mapping) = self.mapping {
            config.mapping = mapping;
        }
        if let Some(min_y) = self.min_y {
            config.scan.min_y = min_y;
        }
        if let Some(max_y) = self.max_y {
            config.scan.max_y = max_y;
        }
        if let Some(step) = self.step {
            config.scan.step = step;
        }
        if let Some(secs) = self.initial_delay_secs {
            config.timing.initial_delay_secs = secs;
        }
        if let Some(secs) = self.record_secs {
            config.timing.record_secs = secs;
        }
        if let Some(secs) = self.cycle_delay_secs {
            config.timing.cycle_delay_secs = secs;
        }
        if let Some(address) = self.bridge_address {
            config.bridge_address = address;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let sink = DirectorySink::new(&config.data_dir);
    let mut out = io::stdout().lock();

    if args.list {
        viewer::list_batches(&mut out, &sink)?;
    }
    if !args.view.is_empty() {
        let mut desk = ViewDesk::new(config.grid_step, config.mapping)?;
        viewer::show_views(&mut out, &sink, &mut desk, &args.view)?;
    }
    drop(out);

    if args.record {
        let summary = Runner::new(config.clone()).record(args.simulate, args.serve)?;
        println!(
            "Session ended -> frames {}, batches saved {}, save failures {}, discarded {}",
            summary.metrics.frames_accepted,
            summary.metrics.batches_saved,
            summary.metrics.save_failures,
            summary.discarded
        );
    } else if args.serve {
        let desk = ViewDesk::new(config.grid_step, config.mapping)?;
        let bridge = GuiBridge::new(
            Arc::new(Mutex::new(desk)),
            sink,
            None,
            config.bridge_address,
        );
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
