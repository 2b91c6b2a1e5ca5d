use clap::Parser;
use fieldx::fxstruct;
use garde::Validate;
use std::ffi::OsString;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Parse(#[from] clap::Error),

    #[error("invalid container settings: {0}")]
    Invalid(#[from] garde::Report),
}

/// Defaults used by [`ContainerAccessor`](super::ContainerAccessor) when a call doesn't name the endpoint, the
/// account key or the database explicitly.
///
/// Usually taken from the environment with [`from_env()`](Self::from_env).
#[derive(Clone, Parser, Validate)]
#[fxstruct(no_new, get(clone))]
#[clap(name = "container-settings", about = "Database container access settings")]
pub struct ContainerSettings {
    /// Account endpoint URL.
    #[clap(long, env = "AZURE_COSMOS_ENDPOINT")]
    #[garde(length(min = 1), custom(http_endpoint))]
    endpoint: String,

    /// Account key used to authenticate against the endpoint.
    #[clap(long, env = "AZURE_COSMOS_ACCOUNT_KEY", hide_env_values = true)]
    #[garde(length(min = 1))]
    account_key: String,

    /// Default database.
    #[clap(long = "database", env = "AZURE_COSMOS_DATABASE_NAME")]
    #[garde(length(min = 1))]
    database_name: String,

    /// Create a container the first time it is accessed if it doesn't exist.
    #[clap(
        long,
        env = "AZURE_COSMOS_ENSURE_CONTAINER_ON_FIRST_USE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    #[fieldx(get(copy))]
    #[garde(skip)]
    ensure_container_on_first_use: bool,
}

// garde hands over the field as is.
#[allow(clippy::ptr_arg)]
fn http_endpoint(value: &String, _: &()) -> garde::Result {
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    }
    else {
        Err(garde::Error::new(format!("endpoint '{value}' is not an http(s) URL")))
    }
}

impl ContainerSettings {
    pub fn new(endpoint: impl Into<String>, account_key: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            endpoint:                      endpoint.into(),
            account_key:                   account_key.into(),
            database_name:                 database_name.into(),
            ensure_container_on_first_use: true,
        }
    }

    pub fn with_ensure_container_on_first_use(mut self, ensure: bool) -> Self {
        self.ensure_container_on_first_use = ensure;
        self
    }

    /// Read settings from the `AZURE_COSMOS_*` environment variables and validate them.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_args(["container-settings"])
    }

    /// Parse command line style arguments, falling back to the environment for anything missing, and validate the
    /// result.
    pub fn from_args<I, T>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let settings = Self::try_parse_from(args)?;
        settings.validate()?;
        Ok(settings)
    }
}

impl std::fmt::Debug for ContainerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSettings")
            .field("endpoint", &self.endpoint)
            .field("account_key", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("ensure_container_on_first_use", &self.ensure_container_on_first_use)
            .finish()
    }
}
