use crate::Generator;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Shortest identifier the generator will produce.
pub const MIN_LENGTH: usize = 4;
/// Identifier length used when none is configured.
pub const DEFAULT_LENGTH: usize = 8;

/// Generates fixed-length identifiers drawn uniformly from `[A-Za-z0-9]`.
///
/// Uses the thread-local RNG, which is seeded from the OS once per thread.
/// Requested lengths below [`MIN_LENGTH`] are clamped up.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(MIN_LENGTH),
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}
