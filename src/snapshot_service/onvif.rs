//! ONVIF snapshot discovery
//!
//! Device service `GetCapabilities` → Media XAddr → `GetProfiles` →
//! first profile token → `GetSnapshotUri` → authenticated GET of the URI.

use async_trait::async_trait;
use base64::Engine;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::config_store::CameraBinding;
use crate::error::{Error, Result};

/// Whole-session bound for one discovery capture
pub const ONVIF_TIMEOUT: Duration = Duration::from_secs(10);

const DEVICE_WSDL: &str = "http://www.onvif.org/ver10/device/wsdl";
const MEDIA_WSDL: &str = "http://www.onvif.org/ver10/media/wsdl";

/// Strategy 1 of the snapshot coordinator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoveryCapture: Send + Sync {
    /// Discover the camera's snapshot URI and return the image bytes
    async fn attempt_discovery_capture(&self, binding: &CameraBinding) -> Result<Vec<u8>>;
}

/// ONVIF SOAP client
pub struct OnvifDiscovery {
    client: reqwest::Client,
    timeout: Duration,
}

impl OnvifDiscovery {
    pub fn new() -> Result<Self> {
        Self::with_timeout(ONVIF_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    async fn soap_call(&self, url: &str, binding: &CameraBinding, body: &str) -> Result<String> {
        let envelope = build_envelope(&binding.username, &binding.password, body);

        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/soap+xml; charset=utf-8")
            .body(envelope)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if text.contains("NotAuthorized") {
            return Err(Error::Onvif(format!("not authorized at {}", url)));
        }
        if !status.is_success() {
            return Err(Error::Onvif(format!("{} returned HTTP {}", url, status.as_u16())));
        }
        Ok(text)
    }

    async fn discover_and_fetch(&self, binding: &CameraBinding) -> Result<Vec<u8>> {
        let device_url = format!(
            "http://{}:{}/onvif/device_service",
            binding.host, binding.port
        );

        let capabilities = self
            .soap_call(
                &device_url,
                binding,
                &format!(
                    r#"<GetCapabilities xmlns="{}"><Category>Media</Category></GetCapabilities>"#,
                    DEVICE_WSDL
                ),
            )
            .await
            .map_err(|e| Error::Onvif(format!("ONVIF connection failed: {}", e)))?;

        let media_url =
            extract_capability_xaddr(&capabilities, "Media").unwrap_or_else(|| device_url.clone());

        let profiles = self
            .soap_call(
                &media_url,
                binding,
                &format!(r#"<GetProfiles xmlns="{}"/>"#, MEDIA_WSDL),
            )
            .await?;

        let token = extract_xml_attribute(&profiles, "Profiles", "token")
            .ok_or_else(|| Error::Onvif("No media profile reported".to_string()))?;

        let snapshot = self
            .soap_call(
                &media_url,
                binding,
                &format!(
                    r#"<GetSnapshotUri xmlns="{}"><ProfileToken>{}</ProfileToken></GetSnapshotUri>"#,
                    MEDIA_WSDL, token
                ),
            )
            .await?;

        let uri = extract_xml_value(&snapshot, "Uri")
            .map(|u| u.replace("&amp;", "&"))
            .ok_or_else(|| Error::Onvif("Failed to get snapshot URI".to_string()))?;

        tracing::debug!(devname = %binding.devname, uri = %uri, "ONVIF snapshot URI resolved");

        let resp = self
            .client
            .get(&uri)
            .basic_auth(&binding.username, Some(&binding.password))
            .send()
            .await
            .map_err(|e| Error::Snapshot(format!("Download failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Snapshot(format!(
                "Download failed: HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Snapshot(format!("Download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DiscoveryCapture for OnvifDiscovery {
    async fn attempt_discovery_capture(&self, binding: &CameraBinding) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.discover_and_fetch(binding)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Onvif(format!(
                "ONVIF session timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// WS-Security UsernameToken with PasswordDigest
pub fn generate_ws_security_header(username: &str, password: &str) -> String {
    let nonce: [u8; 16] = rand::thread_rng().gen();
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let digest = password_digest(&nonce, &created, password);

    let engine = base64::engine::general_purpose::STANDARD;
    format!(
        r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password><wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce><wsu:Created>{}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
        username,
        digest,
        engine.encode(nonce),
        created
    )
}

/// Base64(SHA1(nonce + created + password))
fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn build_envelope(username: &str, password: &str, body: &str) -> String {
    let header = if username.is_empty() {
        String::new()
    } else {
        format!("<s:Header>{}</s:Header>", generate_ws_security_header(username, password))
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">{}<s:Body>{}</s:Body></s:Envelope>"#,
        header, body
    )
}

/// Byte offset just past the start tag `<tag ...>` or `<ns:tag ...>`
fn find_start_tag(xml: &str, tag: &str) -> Option<(usize, usize)> {
    let mut search = 0;
    while let Some(rel) = xml[search..].find('<') {
        let open = search + rel;
        let after = &xml[open + 1..];
        let name_end = after
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(after.len());
        let name = &after[..name_end];
        let local = name.rsplit(':').next().unwrap_or(name);

        if local == tag && !name.starts_with('/') {
            let close = after.find('>')?;
            return Some((open, open + 1 + close + 1));
        }
        search = open + 1;
    }
    None
}

/// Text of the first element with this local name, namespace prefix ignored
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let (_, content_start) = find_start_tag(xml, tag)?;
    let end = xml[content_start..].find("</")?;
    let value = xml[content_start..content_start + end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Attribute of the first element with this local name
pub fn extract_xml_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let (open, content_start) = find_start_tag(xml, tag)?;
    let tag_text = &xml[open..content_start];

    let pattern = format!("{}=", attr);
    let mut search = 0;
    while let Some(rel) = tag_text[search..].find(&pattern) {
        let idx = search + rel;
        let preceded_by_space = tag_text[..idx]
            .chars()
            .last()
            .map(char::is_whitespace)
            .unwrap_or(false);
        let after = &tag_text[idx + pattern.len()..];
        if preceded_by_space {
            let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let value = &after[1..];
            let end = value.find(quote)?;
            return Some(value[..end].to_string());
        }
        search = idx + pattern.len();
    }
    None
}

/// `XAddr` inside a capability section such as `<tt:Media>`
pub fn extract_capability_xaddr(xml: &str, capability: &str) -> Option<String> {
    let (_, section_start) = find_start_tag(xml, capability)?;
    let section = &xml[section_start..];
    let section_end = section
        .find(&format!(":{}>", capability))
        .or_else(|| section.find(&format!("</{}>", capability)))
        .unwrap_or(section.len());
    extract_xml_value(&section[..section_end], "XAddr")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES: &str = r#"<?xml version="1.0"?>
<SOAP-ENV:Envelope><SOAP-ENV:Body><tds:GetCapabilitiesResponse>
<tds:Capabilities>
  <tt:Device><tt:XAddr>http://10.0.0.5/onvif/device_service</tt:XAddr></tt:Device>
  <tt:Media><tt:XAddr>http://10.0.0.5/onvif/media_service</tt:XAddr></tt:Media>
</tds:Capabilities>
</tds:GetCapabilitiesResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

    #[test]
    fn test_capability_xaddr_is_scoped_to_section() {
        assert_eq!(
            extract_capability_xaddr(CAPABILITIES, "Media").as_deref(),
            Some("http://10.0.0.5/onvif/media_service")
        );
        assert_eq!(
            extract_capability_xaddr(CAPABILITIES, "Device").as_deref(),
            Some("http://10.0.0.5/onvif/device_service")
        );
        assert!(extract_capability_xaddr(CAPABILITIES, "Analytics").is_none());
    }

    #[test]
    fn test_profile_token_attribute() {
        let xml = r#"<trt:GetProfilesResponse><trt:Profiles fixed="true" token="Profile_1"><tt:Name>main</tt:Name></trt:Profiles><trt:Profiles token="Profile_2"/></trt:GetProfilesResponse>"#;
        assert_eq!(
            extract_xml_attribute(xml, "Profiles", "token").as_deref(),
            Some("Profile_1")
        );
        assert!(extract_xml_attribute(xml, "Profiles", "missing").is_none());
    }

    #[test]
    fn test_value_ignores_namespace_prefix() {
        let xml = "<trt:MediaUri><tt:Uri>http://cam/snap.jpg</tt:Uri></trt:MediaUri>";
        assert_eq!(extract_xml_value(xml, "Uri").as_deref(), Some("http://cam/snap.jpg"));
        assert_eq!(
            extract_xml_value("<Uri> x </Uri>", "Uri").as_deref(),
            Some("x")
        );
        assert!(extract_xml_value("<tt:Uri></tt:Uri>", "Uri").is_none());
    }

    #[test]
    fn test_password_digest_matches_known_vector() {
        // SHA1 over an empty nonce, empty created and "pass"
        assert_eq!(
            password_digest(&[], "", "pass"),
            "nU4eI71bcnBGqeO0t9tXvY1u5oQ="
        );
    }

    #[test]
    fn test_envelope_has_security_header_only_with_username() {
        let with = build_envelope("admin", "pw", "<X/>");
        assert!(with.contains("<wsse:Username>admin</wsse:Username>"));
        assert!(with.contains("<s:Body><X/></s:Body>"));

        let without = build_envelope("", "", "<X/>");
        assert!(!without.contains("wsse:Security"));
    }
}
