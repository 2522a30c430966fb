/// SDK identity reported to the sandbox in the `osdk` query parameter of every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkMetadata {
    /// Platform name, e.g. `rust` or `android`.
    pub name: String,
    /// SDK version.
    pub version: String,
    /// Build number of the SDK release.
    pub build: u32,
}

/// Build number of this crate release.
const SDK_BUILD: u32 = 1;

impl SdkMetadata {
    /// Value of the `osdk` query parameter: `<platform>-<version>-<build>`.
    pub fn osdk(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.build)
    }
}

impl Default for SdkMetadata {
    fn default() -> SdkMetadata {
        SdkMetadata {
            name: "rust".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            build: SDK_BUILD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SdkMetadata;

    #[test]
    fn osdk_joins_platform_version_and_build() {
        let metadata = SdkMetadata {
            name: "android".to_owned(),
            version: "0.2.0".to_owned(),
            build: 7,
        };

        assert_eq!(metadata.osdk(), "android-0.2.0-7");
    }

    #[test]
    fn default_reports_crate_version() {
        let osdk = SdkMetadata::default().osdk();

        assert!(osdk.starts_with(&format!("rust-{}-", env!("CARGO_PKG_VERSION"))));
    }
}
