use crate::Result;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

/// Database name and credentials the container is initialised with.
#[derive(TypedBuilder)]
pub struct PostgresConfig {
    #[builder(default = "urlshort".to_string())]
    database: String,
    #[builder(default = "urlshort".to_string())]
    username: String,
    #[builder(default = "urlshort".to_string())]
    password: String,
}

/// A throwaway `postgres:16-alpine` container that lives as long as this value.
///
/// The image logs readiness once for its init server and again after the
/// restart, so callers should still retry their first connection.
pub struct PostgresServer {
    container: ContainerAsync<GenericImage>,
    config: PostgresConfig,
}

impl PostgresServer {
    /// Boots the container and waits until the server accepts connections.
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let container = GenericImage::new("postgres", "16-alpine")
            .with_exposed_port(5432_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_DB", config.database.as_str())
            .with_env_var("POSTGRES_USER", config.username.as_str())
            .with_env_var("POSTGRES_PASSWORD", config.password.as_str())
            .start()
            .await?;

        Ok(Self { container, config })
    }

    pub async fn host(&self) -> Result<String> {
        Ok(self.container.get_host().await?.to_string())
    }

    pub async fn port(&self) -> Result<u16> {
        Ok(self.container.get_host_port_ipv4(5432).await?)
    }

    /// Connection string for sqlx, pointing at the mapped host port.
    pub async fn database_url(&self) -> Result<String> {
        let host = self.host().await?;
        let port = self.port().await?;
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }
}
