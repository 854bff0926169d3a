//! `BuildManifest.plist` model.
//!
//! Only the parts needed to find a component's image path are decoded;
//! everything else in the property list is ignored.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Result;

/// Path of the build manifest inside a firmware archive.
pub const BUILD_MANIFEST_PATH: &str = "BuildManifest.plist";

/// Component holding the system cryptex disk image.
pub const SYSTEM_OS_COMPONENT: &str = "Cryptex1,SystemOS";

#[derive(Debug, Deserialize)]
pub struct BuildManifest {
    #[serde(rename = "BuildIdentities")]
    pub build_identities: Vec<BuildIdentity>,
}

#[derive(Debug, Deserialize)]
pub struct BuildIdentity {
    #[serde(rename = "Manifest", default)]
    pub manifest: HashMap<String, ManifestItem>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestItem {
    #[serde(rename = "Info", default)]
    pub info: ItemInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemInfo {
    #[serde(rename = "Path")]
    pub path: Option<String>,
}

impl BuildManifest {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(plist::from_bytes(data)?)
    }

    /// Archive path of `component` in the first build identity.
    ///
    /// Later identities are never consulted.
    pub fn image_path(&self, component: &str) -> Option<&str> {
        self.build_identities
            .first()?
            .manifest
            .get(component)?
            .info
            .path
            .as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>BuildIdentities</key>
    <array>
        <dict>
            <key>ApChipID</key>
            <string>0x8120</string>
            <key>Manifest</key>
            <dict>
                <key>Cryptex1,SystemOS</key>
                <dict>
                    <key>Info</key>
                    <dict>
                        <key>Path</key>
                        <string>images/os.dmg</string>
                    </dict>
                </dict>
                <key>KernelCache</key>
                <dict>
                    <key>Info</key>
                    <dict/>
                </dict>
            </dict>
        </dict>
        <dict>
            <key>Manifest</key>
            <dict>
                <key>Cryptex1,SystemOS</key>
                <dict>
                    <key>Info</key>
                    <dict>
                        <key>Path</key>
                        <string>images/other.dmg</string>
                    </dict>
                </dict>
            </dict>
        </dict>
    </array>
    <key>ProductVersion</key>
    <string>17.0</string>
</dict>
</plist>
"#;

    #[test]
    fn test_first_identity_wins() {
        let manifest = BuildManifest::from_bytes(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.build_identities.len(), 2);
        assert_eq!(
            manifest.image_path(SYSTEM_OS_COMPONENT),
            Some("images/os.dmg")
        );
        assert_eq!(manifest.image_path("KernelCache"), None);
        assert_eq!(manifest.image_path("Missing"), None);
    }

    #[test]
    fn test_no_identities() {
        let plist = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict><key>BuildIdentities</key><array/></dict></plist>"#;
        let manifest = BuildManifest::from_bytes(plist.as_bytes()).unwrap();
        assert_eq!(manifest.image_path(SYSTEM_OS_COMPONENT), None);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            BuildManifest::from_bytes(b"definitely not a plist"),
            Err(Error::MalformedManifest(_))
        ));
    }
}
