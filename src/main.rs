use anyhow::Context;
use clap::Parser;
use pointspire::config::{Config, Overrides};
use pointspire::gpu::context::GpuContext;
use pointspire::gpu::cull::CullStage;
use pointspire::gpu::lpc_pipeline::LpcPipeline;
use pointspire::gpu::point_store::{PointStore, StoreOptions};
use pointspire::lpc;
use pointspire::point_cloud::PointCloudData;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// LAS or LAZ file to index
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read the build back and check it against the host reference
    #[arg(long)]
    validate: bool,

    /// Allocate a separate reorder buffer instead of reusing the visible points
    #[arg(long)]
    dedicated_scratch: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(&Overrides {
        input: args.input,
        validate: args.validate,
        dedicated_scratch: args.dedicated_scratch,
    });

    // A file that fails to load leaves an empty cloud; every stage below is then a no-op.
    let cloud = match &config.input {
        Some(path) => PointCloudData::load(path).unwrap_or_else(|e| {
            log::error!("{e}");
            PointCloudData::empty()
        }),
        None => {
            log::warn!("no input file given");
            PointCloudData::empty()
        }
    };

    let ctx = GpuContext::headless().context("failed to initialise the GPU")?;
    let options = StoreOptions {
        dedicated_scratch: config.build.dedicated_scratch,
    };
    let mut store =
        PointStore::new(&ctx, cloud, options).context("failed to create point store buffers")?;

    let mut pipeline = LpcPipeline::new();
    let summary = pipeline
        .build(&ctx, &mut store)
        .context("LPC build failed")?;
    log::info!("build finished in {:?}", summary.total_time());

    if config.build.validate && summary.point_count > 0 {
        let arrays = LpcPipeline::read_back(&ctx, &store, &summary)?;
        lpc::validate(store.cloud(), &arrays, false)
            .context("GPU build disagrees with the host reference")?;
        log::info!(
            "validation passed, tree depth {}",
            lpc::tree_depth(&arrays.nodes, arrays.num_unique)
        );
    }

    let cull = CullStage::new(config.camera);
    cull.run(&ctx, &store).context("culling frame failed")?;
    let visible = CullStage::visible_count(&ctx, &store)?;
    log::info!("{visible} of {} points visible", store.point_count());
    Ok(())
}
