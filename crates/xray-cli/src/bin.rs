use anyhow::Context;
use burn::backend::NdArray;
use clap::Parser;
use std::path::PathBuf;
use xray_cli::Cli;
use xray_process::{ReplayEngine, eval_stream, latest_checkpoint};

fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse().validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to initialize tokio runtime");

    runtime.block_on(async move {
        env_logger::builder()
            .target(env_logger::Target::Stdout)
            .init();

        let predictions = match args.predictions {
            Some(dir) => dir,
            None => {
                let exp_dir =
                    PathBuf::from(&args.process.eval.output_root).join(&args.process.eval.exp);
                let checkpoint = latest_checkpoint(&exp_dir)
                    .with_context(|| format!("scanning {}", exp_dir.display()))?
                    .with_context(|| format!("no checkpoint under {}", exp_dir.display()))?;
                log::info!("Using checkpoint {}", checkpoint.display());
                checkpoint.join("predictions")
            }
        };

        let device = Default::default();
        let stream = eval_stream::<NdArray, _>(
            args.process,
            ReplayEngine::<NdArray>::new(predictions, device),
            device,
        );
        xray_cli::eval_ui(stream).await
    })
}
