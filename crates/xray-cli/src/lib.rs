use clap::{Error, Parser, error::ErrorKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio_stream::{Stream, StreamExt};
use xray_process::{EvalMessage, EvalVariant, ProcessArgs};

#[derive(Parser)]
#[command(
    author,
    version,
    arg_required_else_help = false,
    about = "xray-eval - score geometric buffer predictions"
)]
pub struct Cli {
    /// Directory of persisted raw predictions to replay. Defaults to
    /// `predictions/` under the newest checkpoint of the experiment.
    #[arg(long, value_name = "DIR")]
    pub predictions: Option<std::path::PathBuf>,

    #[clap(flatten)]
    pub process: ProcessArgs,
}

impl Cli {
    pub fn validate(self) -> Result<Self, Error> {
        if self.process.eval.variant == EvalVariant::FullSr
            && self.process.eval.diffusion_exp.is_none()
        {
            return Err(Error::raw(
                ErrorKind::MissingRequiredArgument,
                "--variant full-sr requires --diffusion-exp",
            ));
        }
        Ok(self)
    }
}

pub async fn eval_ui(
    stream: impl Stream<Item = anyhow::Result<EvalMessage>>,
) -> Result<(), anyhow::Error> {
    let main_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}").expect("Invalid indicatif config"),
    );

    let score_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("Invalid indicatif config")
            .tick_strings(&["📐", "📐"]),
    );

    let sample_progress = ProgressBar::new(0)
        .with_style(
            ProgressStyle::with_template(
                "[{elapsed}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg} ({per_sec}, {eta} remaining)",
            )
            .expect("Invalid indicatif config")
            .progress_chars("◍○○"),
        )
        .with_message("Samples");

    let sp = indicatif::MultiProgress::new();
    let main_spinner = sp.add(main_spinner);
    let sample_progress = sp.add(sample_progress);
    let score_spinner = sp.add(score_spinner);

    main_spinner.enable_steady_tick(Duration::from_millis(120));
    main_spinner.set_message("Starting up");
    log::info!("Starting up");

    if cfg!(debug_assertions) {
        let _ =
            sp.println("ℹ️  running in debug mode, compile with --release for best performance");
    }

    let mut stream = std::pin::pin!(stream);
    let started = Instant::now();

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(error) => {
                // Don't print the error here. It'll bubble up and be printed as output.
                let _ = sp.println("❌ Encountered an error");
                return Err(error);
            }
        };

        match msg {
            EvalMessage::Start {
                total,
                evaluate_dir,
            } => {
                log::info!("Evaluating {total} samples into {}", evaluate_dir.display());
                main_spinner.set_message(format!("Writing to {}", evaluate_dir.display()));
                sample_progress.set_length(total as u64);
            }
            EvalMessage::SampleScored {
                index,
                uid,
                distance,
                running_mean,
            } => {
                sample_progress.set_position(index as u64 + 1);
                score_spinner
                    .set_message(format!("{uid}: {distance:.6} (mean {running_mean:.6})"));
                log::info!("Sample {uid}: chamfer {distance}, running mean {running_mean}");
            }
            EvalMessage::SampleSkipped { index, uid, reason } => {
                sample_progress.set_position(index as u64 + 1);
                log::warn!("Skipped sample {uid}: {reason}");
            }
            EvalMessage::Done { mean, scored, seen } => {
                let _ = sp.println(format!(
                    "✅ Mean chamfer distance {mean:.6} over {scored}/{seen} samples"
                ));
            }
        }
    }

    let duration = Duration::from_secs(started.elapsed().as_secs());
    let _ = sp.println(format!(
        "Evaluation took {}",
        humantime::format_duration(duration)
    ));

    Ok(())
}
