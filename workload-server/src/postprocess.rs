use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Iterations of the accumulation loop.
pub const ACCUMULATION_ROUNDS: usize = 100_000;

/// Length of the returned digest prefix, in hex characters.
pub const POSTPROCESSED_LEN: usize = 32;

/// Hands out the generator used by one postprocessing run.
///
/// Production draws fresh entropy for every run so identical requests produce different
/// digests. Tests pin a seed to assert on exact output.
pub trait RandomSource: Send + Sync {
    fn generator(&self) -> StdRng;
}

/// Seeds every generator from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl RandomSource for OsEntropy {
    fn generator(&self) -> StdRng {
        StdRng::from_entropy()
    }
}

/// Seeds every generator with the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeed(pub u64);

impl RandomSource for FixedSeed {
    fn generator(&self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}

/// Combine the preprocessed digest with a profile into a 32 character lowercase hex digest.
///
/// Every iteration adds the byte at `i mod len(combined)` multiplied by a draw in `[0, 10)`,
/// the decimal accumulator is appended to `combined` and the result hashed once more.
pub fn postprocess<R: Rng + ?Sized>(preprocessed: &str, profile: &str, rng: &mut R) -> String {
    let combined = format!("{preprocessed}{profile}");
    let bytes = combined.as_bytes();

    let mut accumulator: u64 = 0;
    if !bytes.is_empty() {
        for i in 0..ACCUMULATION_ROUNDS {
            accumulator += u64::from(bytes[i % bytes.len()]) * rng.gen_range(0..10u64);
        }
    }

    let mut digest = hex::encode(Sha256::digest(format!("{combined}{accumulator}").as_bytes()));
    digest.truncate(POSTPROCESSED_LEN);
    digest
}
