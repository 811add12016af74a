pub mod random;

pub use random::RandomGenerator;

/// Trait for generating short link identifiers.
///
/// Implementations are pure generators that don't interact with storage.
/// A generated id is only a candidate: detecting that it is already taken is
/// the storage backend's job, and deciding whether to retry is the caller's.
pub trait Generator: Send + Sync + 'static {
    /// Generates a candidate identifier. Generation cannot fail.
    fn generate(&self) -> String;
}

impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    fn generate(&self) -> String {
        (**self).generate()
    }
}
