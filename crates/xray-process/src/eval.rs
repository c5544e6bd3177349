//! The evaluation driver. Walks a dataset split, runs inference through an
//! [`InferenceEngine`], decodes and projects both prediction and ground
//! truth to point clouds, and scores them by chamfer distance.

use crate::accumulator::EvalAccumulator;
use crate::config::{EvalVariant, ProcessArgs};
use crate::engine::{ConditioningInput, InferenceEngine};
use crate::message::EvalMessage;
use anyhow::Context;
use async_fn_stream::try_fn_stream;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::path::Path;
use tokio_stream::Stream;
use xray_buffer::{DecodePolicy, archive};
use xray_dataset::{Sample, SampleLoader, SampleSet, image_to_tensor};
use xray_geom::{RayField, chamfer_distance, pointcloud_to_ply, project_buffer};

/// Run a full evaluation pass, reporting progress as a stream of messages.
///
/// The experiment's `evaluate/` directory is cleared up front and receives
/// one prediction and one ground-truth PLY per scored sample, the raw
/// dense predictions when the variant persists them, and a final metrics
/// summary.
pub fn eval_stream<B: Backend, E: InferenceEngine<B>>(
    args: ProcessArgs,
    mut engine: E,
    device: B::Device,
) -> impl Stream<Item = anyhow::Result<EvalMessage>> {
    try_fn_stream(|emitter| async move {
        let range = args.eval.depth_range();
        let variant = args.eval.variant;
        let size = args.load.size;

        let set = SampleSet::discover(
            Path::new(&args.eval.data_root),
            args.load.phase,
            args.load.val_every,
        )?;
        let loader = SampleLoader::<B>::new(set, args.load.clone(), range, device.clone());

        let evaluate_dir = args.eval.evaluate_dir();
        if evaluate_dir.exists() {
            std::fs::remove_dir_all(&evaluate_dir).context("clearing evaluate directory")?;
        }
        std::fs::create_dir_all(&evaluate_dir).context("creating evaluate directory")?;

        let total = loader.len().min(args.eval.max_samples);
        emitter
            .emit(EvalMessage::Start {
                total,
                evaluate_dir: evaluate_dir.clone(),
            })
            .await;

        let rays = RayField::new(size as u32, size as u32);
        let policy = variant.decode_policy(range);
        // Ground truth carries a trustworthy hit channel, so decoding it
        // never needs the cross-frame heuristic.
        let gt_policy = DecodePolicy::for_range(range)
            .with_monotonic(false)
            .with_use_hit_mask(true);
        let centering = variant.centering();
        let mut rng = StdRng::seed_from_u64(args.eval.seed);
        let mut acc = EvalAccumulator::new(args.eval.nan_policy);

        for index in 0..total {
            let uid = loader.set().uid(index);
            let sample = match loader.load(index) {
                Ok(sample) => sample,
                Err(error) if variant.skips_invalid_samples() => {
                    log::warn!("Skipping sample {uid}: {error}");
                    emitter
                        .emit(EvalMessage::SampleSkipped {
                            index,
                            uid,
                            reason: error.to_string(),
                        })
                        .await;
                    continue;
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("loading sample {uid}"));
                }
            };

            let input = conditioning_input(&args, variant, &sample, &mut rng, &device)?;
            let raw = engine
                .predict(&uid, &input)
                .with_context(|| format!("inference for sample {uid}"))?
                .clamp(-1.0, 1.0);

            if variant.saves_raw_prediction() {
                archive::write_dense(&evaluate_dir.join(format!("{uid}.safetensors")), raw.clone())
                    .context("persisting raw prediction")?;
            }

            let (predicted, truth, distance) = {
                let _span = tracing::trace_span!("score_sample").entered();
                let mut predicted = project_buffer(&policy.decode(raw), &rays);
                let mut truth = project_buffer(&gt_policy.decode(sample.xray.clone()), &rays);
                centering.apply(&mut predicted);
                centering.apply(&mut truth);
                let distance = chamfer_distance(&predicted, &truth);
                (predicted, truth, distance)
            };

            sample
                .image
                .save(evaluate_dir.join(format!("{uid}.png")))
                .context("persisting conditioning image")?;
            std::fs::write(
                evaluate_dir.join(format!("{uid}.ply")),
                pointcloud_to_ply(&predicted)?,
            )?;
            std::fs::write(
                evaluate_dir.join(format!("{uid}_gt.ply")),
                pointcloud_to_ply(&truth)?,
            )?;

            acc.push(distance);
            emitter
                .emit(EvalMessage::SampleScored {
                    index,
                    uid,
                    distance,
                    running_mean: acc.mean(),
                })
                .await;
        }

        let mean = acc.mean();
        std::fs::write(
            evaluate_dir.join("metrics.txt"),
            format!(
                "mean_chamfer {mean}\nscored {}\nseen {}\nskipped_nan {}\n",
                acc.scored(),
                acc.seen(),
                acc.skipped_nan()
            ),
        )?;
        emitter
            .emit(EvalMessage::Done {
                mean,
                scored: acc.scored(),
                seen: acc.seen(),
            })
            .await;
        Ok(())
    })
}

fn conditioning_input<B: Backend>(
    args: &ProcessArgs,
    variant: EvalVariant,
    sample: &Sample<B>,
    rng: &mut StdRng,
    device: &B::Device,
) -> anyhow::Result<ConditioningInput<B>> {
    let image = image_to_tensor::<B>(&sample.image, device);
    let size = args.load.size;

    let input = match variant {
        EvalVariant::Diffusion => ConditioningInput::ImageOnly { image },
        EvalVariant::Upsampler => {
            // Perturb the conditioning buffer so the upsampler is scored
            // under the same input noise it saw in training.
            let scale: f64 = rng.random_range(0.0..0.1);
            let noise = sample
                .xray_lr
                .random_like(Distribution::Normal(0.0, 1.0))
                .mul_scalar(scale);
            let low_res = upsample_nearest(sample.xray_lr.clone() + noise, size);
            ConditioningInput::ImageWithLowRes { image, low_res }
        }
        EvalVariant::FullSr => {
            let diffusion_exp = args
                .eval
                .diffusion_exp
                .as_deref()
                .context("the full-sr pipeline needs --diffusion-exp")?;
            let raw_path = Path::new(&args.eval.output_root)
                .join(diffusion_exp)
                .join("evaluate")
                .join(format!("{}.safetensors", sample.uid));
            let raw = archive::read_dense::<B>(&raw_path, device)
                .with_context(|| format!("loading diffusion-stage prediction for {}", sample.uid))?;
            ConditioningInput::ImageWithLowRes {
                image,
                low_res: upsample_nearest(raw, size),
            }
        }
    };
    Ok(input)
}

fn upsample_nearest<B: Backend>(tensor: Tensor<B, 4>, size: usize) -> Tensor<B, 4> {
    interpolate(
        tensor,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}
