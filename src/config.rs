//! Runtime naming configuration.

use crate::error::ConfigError;

/// Environment variable holding the application name.
pub const APP_NAME_VAR: &str = "STATEFOLD_APP_NAME";
/// Environment variable holding the domain name.
pub const DOMAIN_NAME_VAR: &str = "STATEFOLD_DOMAIN_NAME";
/// Environment variable holding the handler name.
pub const HANDLER_NAME_VAR: &str = "STATEFOLD_HANDLER_NAME";

/// Names identifying where a handler runs and which stores it uses.
///
/// Store names are namespaced by application and domain: entities live in
/// `<app>-<domain>-statestore` and commands in the application-wide
/// `<app>-core-commandstore`.
///
/// # Examples
///
/// ```
/// use statefold::RuntimeConfig;
///
/// let config = RuntimeConfig::new("shop", "orders").with_handler_name("place-order");
/// assert_eq!(config.state_store(), "shop-orders-statestore");
/// assert_eq!(config.command_store(), "shop-core-commandstore");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Application name, shared by every domain of one deployment.
    pub app_name: String,

    /// Domain (bounded context) the handler belongs to.
    pub domain_name: String,

    /// Name of the handler, used in logs.
    ///
    /// Default: empty.
    pub handler_name: String,
}

impl RuntimeConfig {
    /// Names for `app_name`/`domain_name` with an empty handler name.
    pub fn new(app_name: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            domain_name: domain_name.into(),
            handler_name: String::new(),
        }
    }

    /// Load the configuration from the process environment.
    ///
    /// `STATEFOLD_APP_NAME` and `STATEFOLD_DOMAIN_NAME` are required;
    /// `STATEFOLD_HANDLER_NAME` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if a required variable is unset
    /// or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        Ok(Self {
            app_name: required(APP_NAME_VAR)?,
            domain_name: required(DOMAIN_NAME_VAR)?,
            handler_name: lookup(HANDLER_NAME_VAR).unwrap_or_default(),
        })
    }

    /// Set the application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the domain name.
    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = domain_name.into();
        self
    }

    /// Set the handler name.
    pub fn with_handler_name(mut self, handler_name: impl Into<String>) -> Self {
        self.handler_name = handler_name.into();
        self
    }

    /// Table holding this domain's entities.
    pub fn state_store(&self) -> String {
        format!("{}-{}-statestore", self.app_name, self.domain_name)
    }

    /// Table holding every command of the application.
    pub fn command_store(&self) -> String {
        format!("{}-core-commandstore", self.app_name)
    }
}
