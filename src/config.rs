use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    advertising_id::AdvertisingIdProvider,
    storage::{InMemoryStore, KeyValueStore},
    OptableSdk, Result, SdkMetadata,
};

/// Address of an Optable Sandbox: a host and an application ID.
///
/// `Config` is immutable. Everything derived from it (base URL, storage keys) is a pure function
/// of its fields, so two SDK instances built from equal configs share their persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    host: String,
    app: String,
    insecure: bool,
}

const PASSPORT_KEY_PREFIX: &str = "OPTABLE_PASS_";
const TARGETING_KEY_PREFIX: &str = "OPTABLE_TGT_";

impl Config {
    /// Create a config for the sandbox at `host` serving application `app`.
    ///
    /// ```
    /// # use optable::Config;
    /// let config = Config::new("sandbox.customer.com", "my-app");
    /// assert_eq!(config.edge_base_url(), "https://sandbox.customer.com/");
    /// ```
    pub fn new(host: impl Into<String>, app: impl Into<String>) -> Config {
        Config {
            host: host.into(),
            app: app.into(),
            insecure: false,
        }
    }

    /// Use plain `http://` instead of `https://`. Meant for local sandboxes.
    pub fn with_insecure(mut self, insecure: bool) -> Config {
        self.insecure = insecure;
        self
    }

    /// Sandbox host, possibly with a port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Application ID the SDK reports for.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Whether requests go over plain HTTP.
    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// Base URL all sandbox endpoints are relative to.
    pub fn edge_base_url(&self) -> String {
        let proto = if self.insecure { "http://" } else { "https://" };
        format!("{}{}/", proto, self.host)
    }

    /// Storage key of the visitor passport.
    pub fn passport_key(&self) -> String {
        format!("{}{}", PASSPORT_KEY_PREFIX, self.encoded_scope())
    }

    /// Storage key of the cached targeting data.
    pub fn targeting_key(&self) -> String {
        format!("{}{}", TARGETING_KEY_PREFIX, self.encoded_scope())
    }

    // base64 keeps keys of different sandboxes apart in a shared store. It hides nothing.
    fn encoded_scope(&self) -> String {
        STANDARD.encode(format!("{}/{}", self.host, self.app))
    }
}

/// Configuration for [`OptableSdk`].
///
/// # Examples
/// ```no_run
/// # use optable::SdkConfig;
/// let sdk = SdkConfig::new("sandbox.customer.com", "my-app")
///     .user_agent("my-app/1.0")
///     .skip_advertising_id_detection(true)
///     .to_sdk()
///     .unwrap();
/// ```
pub struct SdkConfig {
    pub(crate) config: Config,
    pub(crate) user_agent: String,
    pub(crate) storage: Arc<dyn KeyValueStore>,
    pub(crate) advertising_id_provider: Option<Arc<dyn AdvertisingIdProvider>>,
    pub(crate) skip_advertising_id_detection: bool,
    pub(crate) sdk_metadata: SdkMetadata,
}

impl SdkConfig {
    /// Create a default SDK configuration for the sandbox at `host` serving `app`.
    ///
    /// Defaults to an [`InMemoryStore`], which forgets the passport and the targeting cache when
    /// the process exits. Apps should pass a durable store with [`SdkConfig::storage`].
    pub fn new(host: impl Into<String>, app: impl Into<String>) -> Self {
        SdkConfig::from_config(Config::new(host, app))
    }

    /// Create a default SDK configuration from an existing sandbox [`Config`].
    pub fn from_config(config: Config) -> Self {
        SdkConfig {
            config,
            user_agent: SdkConfig::default_user_agent(),
            storage: Arc::new(InMemoryStore::new()),
            advertising_id_provider: None,
            skip_advertising_id_detection: false,
            sdk_metadata: SdkMetadata::default(),
        }
    }

    /// Talk to the sandbox over plain HTTP.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config = self.config.with_insecure(insecure);
        self
    }

    /// Set the `User-Agent` reported to the sandbox. Mobile hosts should pass the platform
    /// browser user agent here.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the key-value store holding the passport and the targeting cache.
    ///
    /// ```
    /// # use optable::{SdkConfig, InMemoryStore};
    /// let config = SdkConfig::new("sandbox.customer.com", "my-app").storage(InMemoryStore::new());
    /// ```
    pub fn storage(mut self, storage: impl KeyValueStore + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Same as [`SdkConfig::storage`] for a store that is shared with other code.
    pub fn shared_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = storage;
        self
    }

    /// Set the source of the device advertising ID.
    ///
    /// ```
    /// # use optable::{SdkConfig, AdvertisingInfo};
    /// let config = SdkConfig::new("sandbox.customer.com", "my-app")
    ///     .advertising_id_provider(|| Some(AdvertisingInfo::new("38400000-8cf0-11bd-b23e-10b96e40000d", false)));
    /// ```
    pub fn advertising_id_provider(
        mut self,
        provider: impl AdvertisingIdProvider + 'static,
    ) -> Self {
        self.advertising_id_provider = Some(Arc::new(provider));
        self
    }

    /// Do not look the advertising ID up at construction.
    pub fn skip_advertising_id_detection(mut self, skip: bool) -> Self {
        self.skip_advertising_id_detection = skip;
        self
    }

    /// Override the SDK identity reported in the `osdk` query parameter. Used by SDKs wrapping
    /// this crate for other platforms.
    pub fn sdk_metadata(mut self, sdk_metadata: SdkMetadata) -> Self {
        self.sdk_metadata = sdk_metadata;
        self
    }

    /// Create a new [`OptableSdk`] using this configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`](crate::Error::InvalidBaseUrl) if the host does not form a URL.
    /// - [`Error::Io`](crate::Error::Io) if the SDK runtime could not be started.
    pub fn to_sdk(self) -> Result<OptableSdk> {
        OptableSdk::new(self)
    }

    fn default_user_agent() -> String {
        format!("optable-rust-sdk/{}", env!("CARGO_PKG_VERSION"))
    }
}
