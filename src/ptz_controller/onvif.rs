//! ONVIF control provider
//!
//! SOAP over HTTP with WS-Security UsernameToken digest auth. `connect`
//! discovers the Media/PTZ service addresses and the first media profile
//! token; every later command is issued against that profile.

use super::provider::ControlProvider;
use super::soap;
use super::types::{ControlCapabilities, MoveVector, Preset};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::sync::RwLock;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// PTZ address and profile learned at connect
#[derive(Debug, Clone)]
struct OnvifSession {
    ptz_url: String,
    profile_token: String,
}

pub struct OnvifControl {
    /// Device service endpoint, e.g. http://192.168.x.x:80/onvif/device_service
    device_url: String,
    username: String,
    password: String,
    client: Client,
    session: RwLock<Option<OnvifSession>>,
}

impl OnvifControl {
    pub fn new(ip: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            device_url: format!("http://{}:{}/onvif/device_service", ip, port),
            username: username.to_string(),
            password: password.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            session: RwLock::new(None),
        }
    }

    /// Sibling service URL when the device does not advertise one
    fn fallback_service_url(&self, service: &str) -> String {
        if self.device_url.contains("/onvif/device_service") {
            self.device_url
                .replace("/onvif/device_service", &format!("/onvif/{}", service))
        } else {
            let base = self.device_url.trim_end_matches('/');
            match base.rfind('/') {
                Some(pos) => format!("{}/{}", &base[..pos], service),
                None => format!("{}/onvif/{}", base, service),
            }
        }
    }

    /// WS-Security UsernameToken header
    fn security_header(&self) -> String {
        let nonce: [u8; 16] = rand::random();
        let nonce_base64 = base64::engine::general_purpose::STANDARD.encode(nonce);

        let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        // Digest = Base64(SHA1(nonce + created + password))
        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(created.as_bytes());
        hasher.update(self.password.as_bytes());
        let digest_base64 = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

        format!(
            r#"<s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
              s:mustUnderstand="true">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </s:Header>"#,
            soap::escape(&self.username),
            digest_base64,
            nonce_base64,
            created
        )
    }

    fn envelope(&self, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  {}
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
            self.security_header(),
            body
        )
    }

    /// POST a SOAP request and return the response body
    async fn send_soap_request(&self, url: &str, body: &str, action: &str) -> Result<String> {
        tracing::debug!(url = %url, action = %action, "Sending ONVIF request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", SOAP_CONTENT_TYPE)
            .body(self.envelope(body))
            .send()
            .await
            .map_err(|e| Error::Network(format!("ONVIF {} request failed: {}", action, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let reason = soap::fault_reason(&text).unwrap_or_else(|| text.clone());
            tracing::warn!(status = %status, action = %action, reason = %reason, "ONVIF request failed");
            return Err(Error::Network(format!(
                "ONVIF {} failed with status {}: {}",
                action, status, reason
            )));
        }

        if let Some(reason) = soap::fault_reason(&text) {
            return Err(Error::Network(format!("ONVIF {} fault: {}", action, reason)));
        }

        tracing::debug!(action = %action, "ONVIF request succeeded");
        Ok(text)
    }

    async fn current(&self) -> Result<OnvifSession> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Command("ONVIF session is not connected".to_string()))
    }

    /// PTZ request against the connected profile
    async fn ptz_request(&self, action: &str, inner: &str) -> Result<String> {
        let session = self.current().await?;
        let body = format!(
            "<tptz:{action}><tptz:ProfileToken>{token}</tptz:ProfileToken>{inner}</tptz:{action}>",
            action = action,
            token = soap::escape(&session.profile_token),
            inner = inner
        );
        self.send_soap_request(&session.ptz_url, &body, action).await
    }
}

/// Velocity element; zero axes are left out
fn velocity_xml(vector: &MoveVector) -> String {
    let pan = vector.pan * vector.speed;
    let tilt = vector.tilt * vector.speed;
    let zoom = vector.zoom * vector.speed;

    let mut velocity = String::from("<tptz:Velocity>");
    if pan != 0.0 || tilt != 0.0 {
        velocity.push_str(&format!(r#"<tt:PanTilt x="{:.2}" y="{:.2}"/>"#, pan, tilt));
    }
    if zoom != 0.0 {
        velocity.push_str(&format!(r#"<tt:Zoom x="{:.2}"/>"#, zoom));
    }
    velocity.push_str("</tptz:Velocity>");
    velocity
}

fn parse_presets(xml: &str) -> Vec<Preset> {
    soap::elements(xml, "Preset")
        .into_iter()
        .filter_map(|element| {
            let id = soap::attribute(element, "token")?;
            let name = soap::text(element, "Name").unwrap_or_else(|| id.clone());
            Some(Preset { id, name })
        })
        .collect()
}

#[async_trait]
impl ControlProvider for OnvifControl {
    async fn connect(&self) -> Result<()> {
        let caps = self
            .send_soap_request(
                &self.device_url,
                "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>",
                "GetCapabilities",
            )
            .await?;

        let media_url = soap::capability_xaddr(&caps, "Media")
            .unwrap_or_else(|| self.fallback_service_url("media_service"));
        let ptz_url = soap::capability_xaddr(&caps, "PTZ")
            .unwrap_or_else(|| self.fallback_service_url("ptz_service"));

        let profiles = self
            .send_soap_request(&media_url, "<trt:GetProfiles/>", "GetProfiles")
            .await?;
        let profile_token = soap::elements(&profiles, "Profiles")
            .into_iter()
            .find_map(|p| soap::attribute(p, "token"))
            .ok_or_else(|| Error::Network("ONVIF device returned no media profiles".to_string()))?;

        tracing::info!(
            device = %self.device_url,
            profile = %profile_token,
            "ONVIF session established"
        );

        *self.session.write().await = Some(OnvifSession {
            ptz_url,
            profile_token,
        });
        Ok(())
    }

    async fn continuous_move(&self, vector: MoveVector) -> Result<()> {
        self.ptz_request("ContinuousMove", &velocity_xml(&vector))
            .await
            .map(|_| ())
    }

    async fn stop(&self) -> Result<()> {
        self.ptz_request(
            "Stop",
            "<tptz:PanTilt>true</tptz:PanTilt><tptz:Zoom>true</tptz:Zoom>",
        )
        .await
        .map(|_| ())
    }

    async fn fetch_presets(&self) -> Result<Vec<Preset>> {
        let body = self.ptz_request("GetPresets", "").await?;
        Ok(parse_presets(&body))
    }

    async fn goto_preset(&self, token: &str) -> Result<()> {
        let inner = format!(
            r#"<tptz:PresetToken>{}</tptz:PresetToken><tptz:Speed><tt:PanTilt x="1.0" y="1.0"/><tt:Zoom x="1.0"/></tptz:Speed>"#,
            soap::escape(token)
        );
        self.ptz_request("GotoPreset", &inner).await.map(|_| ())
    }

    async fn set_preset(&self, name: &str) -> Result<()> {
        let inner = format!("<tptz:PresetName>{}</tptz:PresetName>", soap::escape(name));
        self.ptz_request("SetPreset", &inner).await.map(|_| ())
    }

    fn capabilities(&self) -> ControlCapabilities {
        ControlCapabilities {
            relative_move: true,
            ..ControlCapabilities::default()
        }
    }
}

impl std::fmt::Debug for OnvifControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnvifControl")
            .field("device_url", &self.device_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
