use std::sync::{Arc, RwLock};

/// Advertising ID of the device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingInfo {
    /// The advertising ID, if the platform has one.
    pub id: Option<String>,
    /// Whether the user opted out of ad personalization ("limit ad tracking").
    pub limit_ad_tracking: bool,
}

impl AdvertisingInfo {
    /// Create advertising info for a known `id`.
    pub fn new(id: impl Into<String>, limit_ad_tracking: bool) -> AdvertisingInfo {
        AdvertisingInfo {
            id: Some(id.into()),
            limit_ad_tracking,
        }
    }

    /// The ID, if it may be sent to the sandbox: present, non-empty and not limited.
    pub fn usable_id(&self) -> Option<&str> {
        if self.limit_ad_tracking {
            return None;
        }
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Source of the device advertising ID.
///
/// Platform integrations implement this to look the ID up (Google Play Services on Android, the
/// IDFA on iOS). The lookup may block; the SDK calls it once, off the caller's thread. Returning
/// `None` means the ID is unavailable.
///
/// Closures returning `Option<AdvertisingInfo>` implement this trait.
pub trait AdvertisingIdProvider: Send + Sync {
    /// Look the advertising ID up.
    fn advertising_info(&self) -> Option<AdvertisingInfo>;
}

impl<T: Fn() -> Option<AdvertisingInfo> + Send + Sync> AdvertisingIdProvider for T {
    fn advertising_info(&self) -> Option<AdvertisingInfo> {
        self()
    }
}

/// Best-effort cache of the advertising ID.
///
/// Holds `None` until detection has completed (or forever, if it never runs or fails). Readers
/// never wait for detection.
#[derive(Default)]
pub(crate) struct AdvertisingIdState {
    info: RwLock<Option<AdvertisingInfo>>,
}

impl AdvertisingIdState {
    pub fn new() -> Self {
        AdvertisingIdState::default()
    }

    pub fn get(&self) -> Option<AdvertisingInfo> {
        // A poisoned lock means a writer panicked. Treat the ID as unknown.
        self.info.read().ok()?.clone()
    }

    pub fn set(&self, info: Option<AdvertisingInfo>) {
        if let Ok(mut slot) = self.info.write() {
            *slot = info;
        }
    }

    /// Run `provider` on a blocking task of `runtime` and store its answer.
    pub fn detect(
        self: &Arc<Self>,
        provider: Arc<dyn AdvertisingIdProvider>,
        runtime: &tokio::runtime::Handle,
    ) {
        let state = Arc::clone(self);
        runtime.spawn_blocking(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                provider.advertising_info()
            }));
            match result {
                Ok(info) => {
                    log::debug!(target: "optable",
                                known = info.is_some(),
                                limit_ad_tracking = info.as_ref().map_or(false, |i| i.limit_ad_tracking);
                                "advertising ID detection finished");
                    state.set(info);
                }
                Err(_) => {
                    log::warn!(target: "optable", "advertising ID provider panicked");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{AdvertisingIdState, AdvertisingInfo};

    #[test]
    fn usable_id_requires_tracking_allowed_and_non_empty_id() {
        assert_eq!(AdvertisingInfo::new("abc", false).usable_id(), Some("abc"));
        assert_eq!(AdvertisingInfo::new("abc", true).usable_id(), None);
        assert_eq!(AdvertisingInfo::new("", false).usable_id(), None);

        let unknown = AdvertisingInfo {
            id: None,
            limit_ad_tracking: false,
        };
        assert_eq!(unknown.usable_id(), None);
    }

    #[tokio::test]
    async fn detect_stores_provider_answer() {
        let state = Arc::new(AdvertisingIdState::new());
        assert!(state.get().is_none());

        let provider = Arc::new(|| Some(AdvertisingInfo::new("abc", false)));
        state.detect(provider, &tokio::runtime::Handle::current());

        for _ in 0..100 {
            if state.get().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(state.get(), Some(AdvertisingInfo::new("abc", false)));
    }

    #[tokio::test]
    async fn detect_survives_panicking_provider() {
        let state = Arc::new(AdvertisingIdState::new());

        let provider = Arc::new(|| -> Option<AdvertisingInfo> { panic!("no play services") });
        state.detect(provider, &tokio::runtime::Handle::current());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(state.get().is_none());
    }
}
