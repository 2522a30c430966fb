use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    runtime::{Handle, Runtime},
    sync::{oneshot, watch},
};

#[cfg(doc)]
use crate::Error;
use crate::{
    advertising_id::{AdvertisingIdState, AdvertisingInfo},
    edge::{EdgeResponse, EdgeService},
    identifiers::{self, Identifier},
    local_storage::LocalStorage,
    sandbox::{
        IdentifyResponse, InitResponse, ProfileResponse, ProfileTraits, SandboxClient,
        TargetingResponse, WitnessProperties, WitnessResponse,
    },
    Config, Result, SdkConfig,
};

/// Client of one Optable Sandbox.
///
/// Every remote operation runs in the background and returns a [`PendingResponse`] that resolves
/// to exactly one [`EdgeResponse`]. Operations never fail synchronously: invalid input is skipped
/// and network or server failures are reported through the response variants.
///
/// It is possible to create several instances, e.g. to integrate with several sandboxes. State
/// (visitor passport, targeting cache) is kept per sandbox in the configured
/// [`KeyValueStore`](crate::KeyValueStore).
///
/// # Runtime
///
/// Requests run on the tokio runtime that is current when the SDK is created. Outside of a
/// runtime, the SDK starts and owns a small one, which is shut down when the SDK is dropped.
///
/// # Examples
/// ```no_run
/// # async fn run() -> optable::Result<()> {
/// use optable::{EdgeResponse, SdkConfig};
///
/// let sdk = SdkConfig::new("sandbox.customer.com", "my-app").to_sdk()?;
///
/// match sdk.identify_email("user@example.com", false, None).await {
///     EdgeResponse::Success(_) => println!("identified"),
///     other => eprintln!("identify failed: {:?}", other.message()),
/// }
/// # Ok(())
/// # }
/// ```
pub struct OptableSdk {
    config: Config,
    client: Arc<SandboxClient>,
    runtime: Handle,
    // Present only when no runtime was current at construction.
    owned_runtime: Option<Runtime>,
    init: watch::Receiver<Option<EdgeResponse<InitResponse>>>,
}

impl OptableSdk {
    /// Create a new `OptableSdk` using the specified configuration.
    ///
    /// Starts advertising ID detection (unless disabled) and calls the sandbox `init` API in the
    /// background. Use [`OptableSdk::wait_for_init`] to observe the `init` outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if the configured host does not form a valid URL.
    /// - [`Error::Io`] if a runtime had to be started and that failed.
    pub fn new(config: SdkConfig) -> Result<OptableSdk> {
        let (owned_runtime, runtime) = match Handle::try_current() {
            Ok(handle) => (None, handle),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("optable-worker")
                    .enable_all()
                    .build()?;
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
        };

        let storage = Arc::new(LocalStorage::new(&config.config, config.storage));
        let edge = EdgeService::new(
            &config.config,
            config.user_agent,
            &config.sdk_metadata,
            storage.clone(),
        )?;

        let advertising_id = Arc::new(AdvertisingIdState::new());
        match config.advertising_id_provider {
            Some(provider) if !config.skip_advertising_id_detection => {
                advertising_id.detect(provider, &runtime);
            }
            _ => {
                log::debug!(target: "optable", "advertising ID detection skipped");
            }
        }

        let client = Arc::new(SandboxClient::new(edge, storage, advertising_id));

        let (init_sender, init) = watch::channel(None);
        {
            let client = Arc::clone(&client);
            runtime.spawn(async move {
                let response = client.init().await;
                // Error means every receiver is gone, i.e. the SDK was dropped.
                let _ = init_sender.send(Some(response));
            });
        }

        log::debug!(target: "optable",
                    host = config.config.host(),
                    app = config.config.app();
                    "created SDK instance");

        Ok(OptableSdk {
            config: config.config,
            client,
            runtime,
            owned_runtime,
            init,
        })
    }

    /// Sandbox this instance talks to.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Outcome of the `init` call made at construction, or `None` while it is in flight.
    pub fn init_result(&self) -> Option<EdgeResponse<InitResponse>> {
        self.init.borrow().clone()
    }

    /// Wait for the `init` call made at construction to complete.
    ///
    /// Waiting is optional. Other calls may be issued before `init` completes; they are sent
    /// without a visitor passport until one is received.
    pub async fn wait_for_init(&self) -> EdgeResponse<InitResponse> {
        let mut init = self.init.clone();
        let result = init.wait_for(Option::is_some).await.map(|value| value.clone());
        match result {
            Ok(Some(response)) => response,
            // The init task is gone without reporting.
            _ => EdgeResponse::UnknownError(None),
        }
    }

    /// Block the current thread until the `init` call made at construction completes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context. Use
    /// [`OptableSdk::wait_for_init`] there instead.
    pub fn wait_for_init_blocking(&self) -> EdgeResponse<InitResponse> {
        self.runtime.block_on(self.wait_for_init())
    }

    /// Call the sandbox `identify` API with a list of type-prefixed identifiers.
    ///
    /// See [`identifiers`](crate::identifiers) for helpers building identifiers. On success, the
    /// payload is an empty map and can be ignored.
    pub fn identify(
        &self,
        ids: impl IntoIterator<Item = Identifier>,
    ) -> PendingResponse<IdentifyResponse> {
        let ids: Vec<Identifier> = ids.into_iter().collect();
        self.spawn(move |client| async move { client.identify(&ids).await })
    }

    /// Call the sandbox `identify` API with the SHA-256 of `email`, the device advertising ID
    /// when `include_advertising_id` is set, and `custom_id` when provided.
    ///
    /// An invalid `email` is skipped. The advertising ID is skipped if it is not known yet
    /// (detection runs in the background after construction and is never waited for), unavailable
    /// or limited by the user.
    pub fn identify_email(
        &self,
        email: &str,
        include_advertising_id: bool,
        custom_id: Option<&str>,
    ) -> PendingResponse<IdentifyResponse> {
        let advertising_info = self.client.advertising_info();
        let ids = identifiers::identifier_list(
            email,
            include_advertising_id,
            advertising_info.as_ref(),
            custom_id,
        );
        self.identify(ids)
    }

    /// Call `identify` with the email digest found in the `oeid` parameter of a deep link.
    ///
    /// Returns `None` without calling the sandbox if `uri` holds no valid `oeid` parameter.
    pub fn identify_from_uri(&self, uri: &str) -> Option<PendingResponse<IdentifyResponse>> {
        let oeid = identifiers::eid_from_uri(uri)?;
        Some(self.identify([oeid]))
    }

    /// Call the sandbox `profile` API to associate `traits` with the visitor.
    pub fn profile(&self, traits: ProfileTraits) -> PendingResponse<ProfileResponse> {
        self.spawn(move |client| async move { client.profile(&traits).await })
    }

    /// Call the sandbox `targeting` API.
    ///
    /// On success, the response is also cached and available through
    /// [`OptableSdk::targeting_from_cache`].
    pub fn targeting(&self) -> PendingResponse<TargetingResponse> {
        self.spawn(|client| async move { client.targeting().await })
    }

    /// The last successful targeting response, without calling the sandbox.
    ///
    /// Returns `None` if there is none, the cache was cleared, or the store failed.
    pub fn targeting_from_cache(&self) -> Option<TargetingResponse> {
        match self.client.targeting_from_cache() {
            Ok(targeting) => targeting,
            Err(err) => {
                log::warn!(target: "optable", "failed to read targeting cache: {:?}", err);
                None
            }
        }
    }

    /// Drop the cached targeting response.
    pub fn targeting_clear_cache(&self) -> Result<()> {
        self.client.targeting_clear_cache()
    }

    /// Call the sandbox `witness` API to log `event` (e.g., `app.screenView`) with `properties`.
    pub fn witness(
        &self,
        event: impl Into<String>,
        properties: WitnessProperties,
    ) -> PendingResponse<WitnessResponse> {
        let event = event.into();
        self.spawn(move |client| async move { client.witness(&event, &properties).await })
    }

    /// Advertising ID info, if detection has completed.
    pub fn advertising_info(&self) -> Option<AdvertisingInfo> {
        self.client.advertising_info()
    }

    /// Whether a usable advertising ID is known, i.e. `identify_email(.., true, ..)` would send
    /// it.
    pub fn has_advertising_id(&self) -> bool {
        self.client.has_advertising_id()
    }

    fn spawn<T, F, Fut>(&self, f: F) -> PendingResponse<T>
    where
        F: FnOnce(Arc<SandboxClient>) -> Fut,
        Fut: Future<Output = EdgeResponse<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let operation = f(Arc::clone(&self.client));
        self.runtime.spawn(async move {
            // Error means the caller dropped the PendingResponse.
            let _ = sender.send(operation.await);
        });
        PendingResponse { receiver }
    }
}

impl Drop for OptableSdk {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned_runtime.take() {
            // Does not block, so the SDK can be dropped from async code.
            runtime.shutdown_background();
        }
    }
}

/// Outcome of a remote operation that is still running.
///
/// `PendingResponse` is a future. Await it from async code, or call
/// [`PendingResponse::blocking_wait`] from a plain thread. Dropping it does not cancel the
/// operation. If the operation cannot complete because the SDK runtime shut down, it resolves to
/// [`EdgeResponse::UnknownError`].
#[must_use = "dropping a PendingResponse discards the outcome, the request still runs"]
pub struct PendingResponse<T> {
    receiver: oneshot::Receiver<EdgeResponse<T>>,
}

impl<T> PendingResponse<T> {
    /// Block the current thread until the outcome is available.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context. Await the `PendingResponse`
    /// there instead.
    pub fn blocking_wait(self) -> EdgeResponse<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(EdgeResponse::UnknownError(None))
    }
}

impl<T> Future for PendingResponse<T> {
    type Output = EdgeResponse<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(EdgeResponse::UnknownError(None)))
    }
}
