use std::time::Duration;
use typed_builder::TypedBuilder;
use urlshort_generator::random::DEFAULT_LENGTH;

/// Registry tuning knobs. Every field has a working default.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RegistrySettings {
    /// Length of generated ids. Values under the generator minimum are raised.
    #[builder(default = DEFAULT_LENGTH)]
    pub id_length: usize,
    /// Upper bound for every call the registry makes into storage.
    #[builder(default = Duration::from_secs(5))]
    pub operation_timeout: Duration,
    /// How many fresh ids a create tries before giving up on collisions.
    #[builder(default = 3)]
    pub create_attempts: usize,
    #[builder(default)]
    pub deletion: DeletionSettings,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct DeletionSettings {
    /// Period between batch flushes.
    #[builder(default = Duration::from_secs(10))]
    pub flush_interval: Duration,
    /// Intake buffer size. Requests beyond it are rejected.
    #[builder(default = 512)]
    pub queue_capacity: usize,
    #[builder(default = Duration::from_secs(5))]
    pub flush_timeout: Duration,
    /// How long shutdown waits for the final flush.
    #[builder(default = Duration::from_secs(5))]
    pub drain_timeout: Duration,
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
