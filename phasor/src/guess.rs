//! Initial image guesses.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rustfft::num_complex::Complex64;

use crate::volume::{voxel_count, Dims, Volume};

/// Complex field with real and imaginary parts uniform in `[0, 1)`.
///
/// The same seed always produces the same guess; without a seed the
/// generator is seeded from the thread RNG.
pub fn random_guess(dims: Dims, seed: Option<u64>) -> Volume<Complex64> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    let data = (0..voxel_count(dims))
        .map(|_| Complex64::new(rng.random::<f64>(), rng.random::<f64>()))
        .collect();
    Volume::new(dims, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_guess_is_reproducible() {
        let a = random_guess([3, 4, 5], Some(7));
        let b = random_guess([3, 4, 5], Some(7));
        let c = random_guess([3, 4, 5], Some(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_guess_values_in_unit_square() {
        let guess = random_guess([4, 4, 4], None);
        assert_eq!(guess.dims(), [4, 4, 4]);
        assert!(guess
            .iter()
            .all(|v| (0.0..1.0).contains(&v.re) && (0.0..1.0).contains(&v.im)));
    }
}
