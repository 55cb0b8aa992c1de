//! Tests for the 3-D transform and FFT convolution.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::*;

fn random_complex(dims: Dims, seed: u64) -> Volume<Complex64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..voxel_count(dims))
        .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
        .collect();
    Volume::new(dims, data)
}

fn random_real(dims: Dims, seed: u64) -> Volume<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..voxel_count(dims))
        .map(|_| rng.random_range(0.0..1.0))
        .collect();
    Volume::new(dims, data)
}

/// Direct evaluation of the centered linear convolution.
fn direct_convolve_same(input: &Volume<f64>, kernel: &Volume<f64>) -> Volume<f64> {
    let a = input.dims();
    let b = kernel.dims();
    let offset: [isize; 3] = std::array::from_fn(|axis| ((b[axis] - 1) / 2) as isize);
    let mut out = Volume::new_filled(a, 0.0);
    for o0 in 0..a[0] {
        for o1 in 0..a[1] {
            for o2 in 0..a[2] {
                let n = [
                    o0 as isize + offset[0],
                    o1 as isize + offset[1],
                    o2 as isize + offset[2],
                ];
                let mut acc = 0.0;
                for k0 in 0..b[0] {
                    for k1 in 0..b[1] {
                        for k2 in 0..b[2] {
                            let i = [n[0] - k0 as isize, n[1] - k1 as isize, n[2] - k2 as isize];
                            if (0..3).all(|ax| i[ax] >= 0 && (i[ax] as usize) < a[ax]) {
                                acc += input[(i[0] as usize, i[1] as usize, i[2] as usize)]
                                    * kernel[(k0, k1, k2)];
                            }
                        }
                    }
                }
                out[(o0, o1, o2)] = acc;
            }
        }
    }
    out
}

#[test]
fn test_forward_inverse_round_trip() {
    let dims = [4, 6, 5];
    let original = random_complex(dims, 7);
    let mut fft = Fft3::new(dims);
    let mut work = original.clone();
    fft.forward(&mut work);
    fft.inverse(&mut work);

    for (a, b) in work.iter().zip(original.iter()) {
        assert!((a - b).norm() < 1e-10, "round trip drifted: {a} vs {b}");
    }
}

#[test]
fn test_forward_of_delta_is_flat() {
    let dims = [3, 4, 2];
    let mut delta = Volume::new_filled(dims, Complex64::default());
    delta[0] = Complex64::new(1.0, 0.0);
    Fft3::new(dims).forward(&mut delta);
    assert!(delta.iter().all(|v| (v - Complex64::new(1.0, 0.0)).norm() < 1e-12));
}

#[test]
fn test_forward_of_constant_concentrates_at_origin() {
    let dims = [4, 4, 4];
    let mut constant = Volume::new_filled(dims, Complex64::new(2.0, 0.0));
    Fft3::new(dims).forward(&mut constant);
    assert!((constant[0] - Complex64::new(128.0, 0.0)).norm() < 1e-9);
    assert!(constant.iter().skip(1).all(|v| v.norm() < 1e-9));
}

#[test]
fn test_forward_matches_direct_dft_along_middle_axis() {
    let dims = [1, 5, 1];
    let input = random_complex(dims, 3);
    let mut transformed = input.clone();
    Fft3::new(dims).forward(&mut transformed);

    for k in 0..5 {
        let expected: Complex64 = (0..5)
            .map(|n| {
                let angle = -2.0 * std::f64::consts::PI * (k * n) as f64 / 5.0;
                input[n] * Complex64::from_polar(1.0, angle)
            })
            .sum();
        assert!((transformed[k] - expected).norm() < 1e-10);
    }
}

#[test]
fn test_release_scratch_keeps_results_identical() {
    let dims = [6, 5, 4];
    let input = random_complex(dims, 11);
    let mut fft = Fft3::new(dims);

    let mut first = input.clone();
    fft.forward(&mut first);
    fft.release_scratch();
    let mut second = input.clone();
    fft.forward(&mut second);

    assert_eq!(first, second);
}

#[test]
fn test_convolve_same_matches_direct_sum() {
    let input = random_real([5, 4, 6], 1);
    let kernel = random_real([3, 2, 3], 2);
    let fast = fft_convolve_same(&input, &kernel);
    let direct = direct_convolve_same(&input, &kernel);

    assert_eq!(fast.dims(), input.dims());
    for (f, d) in fast.iter().zip(direct.iter()) {
        assert!((f - d).abs() < 1e-9, "fft {f} vs direct {d}");
    }
}

#[test]
fn test_convolve_with_unit_impulse_is_identity() {
    let input = random_real([4, 5, 3], 9);
    let mut impulse = Volume::new_filled([3, 3, 3], 0.0);
    impulse[(1, 1, 1)] = 1.0;

    let out = FftConvolver::default().convolve_same(&input, &impulse);
    for (o, i) in out.iter().zip(input.iter()) {
        assert!((o - i).abs() < 1e-10);
    }
}

#[test]
fn test_convolver_reuses_plans() {
    let mut convolver = FftConvolver::default();
    let input = random_real([4, 4, 4], 5);
    let kernel = random_real([2, 2, 2], 6);
    let first = convolver.convolve_same(&input, &kernel);
    convolver.release_scratch();
    let second = convolver.convolve_same(&input, &kernel);
    assert_eq!(convolver.plans.len(), 1);
    assert_eq!(first, second);
}
