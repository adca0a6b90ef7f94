use crate::cli::BackendKind;
use crate::services::config::{AuditConfig, ConfigError};
use crate::services::directory::DirectoryService;
use crate::services::fixture::FixtureBackend;
use crate::services::owner::OwnerQuery;
use crate::services::powershell::PowerShellBackend;
use std::sync::Arc;

/// The two capabilities the pipeline consumes, backed by one implementation.
pub struct Backends {
    pub owners: Arc<dyn OwnerQuery>,
    pub directory: Arc<dyn DirectoryService>,
}

pub fn build(config: &AuditConfig) -> anyhow::Result<Backends> {
    match config.backend {
        BackendKind::Powershell => {
            tracing::info!(program = %config.powershell, "using powershell backend");
            let backend = Arc::new(PowerShellBackend::new(
                config.powershell.clone(),
                config.owner_timeout(),
            ));
            Ok(Backends {
                owners: backend.clone(),
                directory: backend,
            })
        }
        BackendKind::Fixture => {
            let path = config.fixture.as_deref().ok_or(ConfigError::MissingFixture)?;
            let backend = Arc::new(FixtureBackend::open(path)?);
            Ok(Backends {
                owners: backend.clone(),
                directory: backend,
            })
        }
    }
}
