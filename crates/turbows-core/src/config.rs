//! Engine and client endpoint configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use turbows_protocol::{
    DEFAULT_BUFFER_STEP_SIZE, DEFAULT_INCOMING_BUFFER_SIZE, Extension, HeaderMap,
    ProtocolVersion, UpgradeResponse,
};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Values parsed but are unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Limits applied to every connection an engine creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum bytes held for not-yet-complete frames.
    pub incoming_buffer_size: usize,

    /// Growth increment of the incoming buffer.
    pub buffer_step_size: usize,

    /// Largest reassembled message accepted; larger messages close with 1009.
    pub max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            incoming_buffer_size: DEFAULT_INCOMING_BUFFER_SIZE,
            buffer_step_size: DEFAULT_BUFFER_STEP_SIZE,
            max_message_size: DEFAULT_INCOMING_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Create a configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Check the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the step is zero, the buffer is
    /// smaller than one step, or the message limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_step_size == 0 {
            return Err(ConfigError::Invalid("buffer_step_size must be > 0".into()));
        }
        if self.incoming_buffer_size < self.buffer_step_size {
            return Err(ConfigError::Invalid(format!(
                "incoming_buffer_size ({}) must be at least buffer_step_size ({})",
                self.incoming_buffer_size, self.buffer_step_size
            )));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be > 0".into()));
        }
        Ok(())
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format follows the file extension. Environment variables with
    /// the `TURBOWS_` prefix override file settings, for example
    /// `TURBOWS_MAX_MESSAGE_SIZE=65536`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use turbows_core::EngineConfig;
    ///
    /// let config = EngineConfig::from_file("turbows.toml").expect("Failed to load config");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, "TURBOWS")
    }

    /// Load configuration from a file with custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the maximum incoming buffer size.
    #[must_use]
    pub fn incoming_buffer_size(mut self, size: usize) -> Self {
        self.config.incoming_buffer_size = size;
        self
    }

    /// Set the buffer growth step.
    #[must_use]
    pub fn buffer_step_size(mut self, size: usize) -> Self {
        self.config.buffer_step_size = size;
        self
    }

    /// Set the largest accepted message.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::validate`].
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Hook that may edit the outgoing upgrade request headers.
pub type BeforeRequest = Arc<dyn Fn(&mut HeaderMap) + Send + Sync>;

/// Hook that inspects the server's upgrade response. An `Err` aborts the
/// handshake with the given reason.
pub type AfterResponse = Arc<dyn Fn(&UpgradeResponse) -> Result<(), String> + Send + Sync>;

/// What a client endpoint asks for when it connects.
#[derive(Clone, Default)]
pub struct ClientEndpointConfig {
    /// Sub-protocols, most preferred first.
    pub subprotocols: Vec<String>,
    /// Extensions to offer.
    pub extensions: Vec<Extension>,
    /// Protocol version to request.
    pub version: ProtocolVersion,
    /// Origin to announce; derived from the URI when `None`.
    pub origin: Option<String>,
    /// Runs on the request headers just before they are sent.
    pub before_request: Option<BeforeRequest>,
    /// Runs on the response before it is validated.
    pub after_response: Option<AfterResponse>,
}

impl ClientEndpointConfig {
    /// Defaults: RFC 6455, nothing offered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer sub-protocols.
    #[must_use]
    pub fn subprotocols<I, S>(mut self, subprotocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = subprotocols.into_iter().map(Into::into).collect();
        self
    }

    /// Offer extensions.
    #[must_use]
    pub fn extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Request a specific protocol version.
    #[must_use]
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Announce an explicit origin.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Install a request hook.
    #[must_use]
    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HeaderMap) + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(hook));
        self
    }

    /// Install a response hook.
    #[must_use]
    pub fn after_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UpgradeResponse) -> Result<(), String> + Send + Sync + 'static,
    {
        self.after_response = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ClientEndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEndpointConfig")
            .field("subprotocols", &self.subprotocols)
            .field("extensions", &self.extensions)
            .field("version", &self.version)
            .field("origin", &self.origin)
            .field("before_request", &self.before_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .finish()
    }
}
