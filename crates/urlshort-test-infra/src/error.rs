use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestInfraError {
    /// Starting the container or querying its mapped address failed.
    #[error("container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
