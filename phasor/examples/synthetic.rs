//! Reconstructs a synthetic object from its simulated diffraction amplitude.
//!
//! Run with `cargo run -p phasor --example synthetic [config.yaml]`. Without a
//! config file a built-in ER/HIO schedule with shrink-wrap is used.

use anyhow::Context;
use common::log_setup::{setup_logging, LogConfig};
use phasor::prelude::*;
use phasor::{initial_mask, Extent, Fft3, SequenceItem, TriggerSetting};

const DIMS: Dims = [32, 32, 32];

fn main() -> anyhow::Result<()> {
    setup_logging(&LogConfig::console("info"));

    let config = match std::env::args().nth(1) {
        Some(path) => ReconstructionConfig::load(&path)
            .with_context(|| format!("failed to load config '{}'", path))?,
        None => default_config(),
    };

    let object = synthetic_object();
    let data = diffraction_amplitude(&object);

    let control = RunControl::new().with_progress(|progress: &IterationProgress| {
        if progress.iteration % 20 == 0 {
            tracing::info!(
                "iteration {}/{} ({}): error {:.3e}",
                progress.iteration,
                progress.total,
                progress.algorithm,
                progress.error
            );
        }
    });

    let result = Reconstruction::from_config(data, &config, RunKind::First, ResumeState::default())?
        .with_control(control)
        .run();

    let first = result.errors.first().copied().unwrap_or(f64::NAN);
    let last = result.errors.last().copied().unwrap_or(f64::NAN);
    let support_voxels = result.support.iter().filter(|&&v| v > 0.0).count();
    println!(
        "{} iterations, error {:.3e} -> {:.3e}, support {} voxels (object {})",
        result.iterations_run,
        first,
        last,
        support_voxels,
        8 * 10 * 6
    );

    Ok(())
}

fn default_config() -> ReconstructionConfig {
    ReconstructionConfig {
        algorithm_sequence: vec![vec![
            SequenceItem::Repeat(2),
            SequenceItem::Step(AlgorithmId::Er, 20),
            SequenceItem::Step(AlgorithmId::Hio, 80),
        ]],
        amp_support_trigger: vec![TriggerSetting::every(1, 10)],
        support_area: vec![Extent::Fraction(0.5); 3],
        support_sigma: 1.0,
        support_threshold: 0.1,
        avg_iterations: 10,
        seed: Some(7),
        ..Default::default()
    }
}

/// Centered box with a linear phase ramp.
fn synthetic_object() -> Volume<Complex64> {
    let mask = initial_mask(DIMS, [8, 10, 6]);
    let mut object = mask.map(|_| Complex64::default());
    for index in 0..mask.len() {
        if mask[index] {
            let [i0, i1, i2] = mask.coords_of(index);
            let phase = 0.05 * (i0 as f64 - i1 as f64) + 0.02 * i2 as f64;
            object[index] = Complex64::from_polar(1.0, phase);
        }
    }
    object
}

fn diffraction_amplitude(object: &Volume<Complex64>) -> Volume<f64> {
    let mut field = object.clone();
    Fft3::new(object.dims()).forward(&mut field);
    phasor::magnitude(&field)
}
