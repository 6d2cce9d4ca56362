// ── Node bootstrap metadata ──
//
// A newly installed machine phones home to the node registry using a
// metadata URL and one-shot credentials. Both travel to the installer
// inside the system's templating attributes as a debconf preseed.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::error::CoreError;

/// Key under which the preseed is stored in a system's `ks_meta`.
pub const PRESEED_KEY: &str = "NODE_PRESEED";

/// Out-of-band payload handed over by the node registry.
#[derive(Debug, Clone)]
pub struct BootstrapMetadata {
    pub metadata_url: Url,
    pub credentials: SecretString,
}

/// Cloud-config applied on first boot of every node.
#[derive(Serialize)]
struct LocalCloudConfig {
    apt_preserve_sources_list: bool,
    manage_etc_hosts: &'static str,
}

fn preseed_line(name: &str, kind: &str, value: &str) -> String {
    format!("cloud-init   cloud-init/{name}  {kind} {value}")
}

/// Escape a multi-line value for a single debconf line.
fn debconf_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

impl BootstrapMetadata {
    pub fn new(metadata_url: Url, credentials: impl Into<SecretString>) -> Self {
        Self {
            metadata_url,
            credentials: credentials.into(),
        }
    }

    /// Render the debconf preseed that configures cloud-init on the node.
    pub fn compose_preseed(&self) -> Result<String, CoreError> {
        let cloud_config = serde_yaml::to_string(&LocalCloudConfig {
            apt_preserve_sources_list: true,
            manage_etc_hosts: "localhost",
        })
        .map_err(|e| CoreError::Internal(format!("cannot render cloud-config: {e}")))?;

        let lines = [
            preseed_line("datasources", "multiselect", "MAAS"),
            preseed_line("maas-metadata-url", "string", self.metadata_url.as_str()),
            preseed_line(
                "maas-metadata-credentials",
                "string",
                self.credentials.expose_secret(),
            ),
            preseed_line("local-cloud-config", "string", &debconf_escape(&cloud_config)),
        ];
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn metadata() -> BootstrapMetadata {
        BootstrapMetadata::new(
            Url::parse("http://registry.example.com/metadata/").unwrap(),
            "oauth_token=abc&oauth_consumer_key=def",
        )
    }

    #[test]
    fn preseed_has_one_line_per_item() {
        let preseed = metadata().compose_preseed().unwrap();
        let lines: Vec<&str> = preseed.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "cloud-init   cloud-init/datasources  multiselect MAAS");
        assert_eq!(
            lines[1],
            "cloud-init   cloud-init/maas-metadata-url  string http://registry.example.com/metadata/"
        );
        assert_eq!(
            lines[2],
            "cloud-init   cloud-init/maas-metadata-credentials  string oauth_token=abc&oauth_consumer_key=def"
        );
    }

    #[test]
    fn cloud_config_is_escaped_onto_one_line() {
        let preseed = metadata().compose_preseed().unwrap();
        let last = preseed.lines().last().unwrap();

        assert_eq!(
            last,
            "cloud-init   cloud-init/local-cloud-config  string \
             apt_preserve_sources_list: true\\nmanage_etc_hosts: localhost\\n"
        );
    }

    #[test]
    fn escaping_doubles_backslashes_first() {
        assert_eq!(debconf_escape("a\\b\nc"), "a\\\\b\\nc");
    }
}
