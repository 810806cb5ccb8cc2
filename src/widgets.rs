//! Form widget adapters.
//!
//! Widgets here describe what to render (template name and context) and validate
//! what comes back; rendering itself belongs to the host's template engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConfigError, WidgetError};
use crate::identity::RequestContext;
use crate::settings::Settings;

pub const RECAPTCHA_PUBLIC_KEY: &str = "recaptcha.public_key";
pub const RECAPTCHA_PRIVATE_KEY: &str = "recaptcha.private_key";
pub const RECAPTCHA_TIMEOUT: &str = "recaptcha.timeout";
pub const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/verify";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub uid: String,
    pub filename: String,
    pub mimetype: Option<String>,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Temporary storage for files uploaded before the whole form validates.
pub trait UploadTempStore: Send + Sync {
    fn get(&self, uid: &str) -> Option<UploadedFile>;
    fn set(&self, file: UploadedFile);
    fn remove(&self, uid: &str) -> Option<UploadedFile>;
    fn preview_url(&self, _uid: &str) -> Option<String> { None }
}

type Uploads = HashMap<String, HashMap<String, UploadedFile>>;

/// Upload stores for every session, keyed by session id.
#[derive(Debug, Clone, Default)]
pub struct SessionUploads {
    inner: Arc<RwLock<Uploads>>,
}

impl SessionUploads {
    pub fn new() -> Self { Self::default() }

    pub fn store_for(&self, session_id: &str) -> SessionUploadTempStore {
        SessionUploadTempStore { session_id: session_id.to_string(), inner: self.inner.clone() }
    }

    /// Drop everything a session uploaded, e.g. when it is invalidated.
    pub fn clear_session(&self, session_id: &str) -> usize {
        self.inner.write().remove(session_id).map(|m| m.len()).unwrap_or(0)
    }
}

/// One session's view of `SessionUploads`.
#[derive(Debug, Clone)]
pub struct SessionUploadTempStore {
    session_id: String,
    inner: Arc<RwLock<Uploads>>,
}

impl UploadTempStore for SessionUploadTempStore {
    fn get(&self, uid: &str) -> Option<UploadedFile> {
        self.inner.read().get(&self.session_id).and_then(|m| m.get(uid)).cloned()
    }

    fn set(&self, file: UploadedFile) {
        self.inner
            .write()
            .entry(self.session_id.clone())
            .or_default()
            .insert(file.uid.clone(), file);
    }

    fn remove(&self, uid: &str) -> Option<UploadedFile> {
        self.inner.write().get_mut(&self.session_id).and_then(|m| m.remove(uid))
    }
}

#[derive(Clone)]
pub struct FileUploadWidget {
    pub template: &'static str,
    pub readonly_template: &'static str,
    pub tmpstore: Arc<dyn UploadTempStore>,
}

impl std::fmt::Debug for FileUploadWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUploadWidget")
            .field("template", &self.template)
            .field("readonly_template", &self.readonly_template)
            .finish()
    }
}

/// Upload widget backed by the requesting session's temp store.
pub fn file_upload_widget(request: &RequestContext, uploads: &SessionUploads) -> Result<FileUploadWidget, WidgetError> {
    let sid = request.session_id.as_deref().ok_or(WidgetError::NoSession)?;
    Ok(FileUploadWidget {
        template: "file_upload",
        readonly_template: "readonly/file_upload",
        tmpstore: Arc::new(uploads.store_for(sid)),
    })
}

pub fn image_upload_widget(request: &RequestContext, uploads: &SessionUploads) -> Result<FileUploadWidget, WidgetError> {
    let mut widget = file_upload_widget(request, uploads)?;
    widget.template = "image_upload";
    Ok(widget)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineMappingWidget {
    pub template: &'static str,
    pub error_class: &'static str,
}

impl Default for InlineMappingWidget {
    fn default() -> Self { Self { template: "inline_mapping", error_class: "deform-error" } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecaptchaRender {
    pub template: &'static str,
    pub cstruct: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct RecaptchaWidget {
    pub template: &'static str,
    pub readonly_template: &'static str,
    pub url: String,
    public_key: String,
    private_key: String,
    timeout: Duration,
    remote_ip: Option<String>,
}

impl RecaptchaWidget {
    /// Bind the widget to the current request. Keys come from settings.
    pub fn for_request(settings: &Settings, request: &RequestContext) -> Result<Self, ConfigError> {
        let secs = settings.float_or(RECAPTCHA_TIMEOUT, 10.0)?;
        let timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| ConfigError::invalid(RECAPTCHA_TIMEOUT, secs, "a positive number of seconds"))?;
        Ok(Self {
            template: "recaptcha",
            readonly_template: "recaptcha",
            url: RECAPTCHA_VERIFY_URL.to_string(),
            public_key: settings.require_str(RECAPTCHA_PUBLIC_KEY)?.to_string(),
            private_key: settings.require_str(RECAPTCHA_PRIVATE_KEY)?.to_string(),
            timeout,
            remote_ip: request.remote_addr.clone(),
        })
    }

    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub fn serialize(&self, cstruct: Option<&str>, readonly: bool) -> RecaptchaRender {
        RecaptchaRender {
            template: if readonly { self.readonly_template } else { self.template },
            cstruct: cstruct.unwrap_or_default().to_string(),
            public_key: self.public_key.clone(),
        }
    }

    /// Validate the submitted challenge against the verification service.
    /// `None` (nothing submitted) passes through untouched.
    pub async fn deserialize(
        &self,
        pstruct: Option<BTreeMap<String, String>>,
    ) -> Result<Option<BTreeMap<String, String>>, WidgetError> {
        let Some(pstruct) = pstruct else { return Ok(None) };
        let field = |k: &str| pstruct.get(k).map(|s| s.as_str()).unwrap_or_default().to_string();
        let challenge = field("recaptcha_challenge_field");
        let response = field("recaptcha_response_field");
        if response.is_empty() {
            return Err(WidgetError::Invalid("Please enter the characters you see.".into()));
        }
        if challenge.is_empty() {
            return Err(WidgetError::Invalid("Challenge data was missing.".into()));
        }

        let params = [
            ("privatekey", self.private_key.as_str()),
            ("remoteip", self.remote_ip.as_deref().unwrap_or_default()),
            ("challenge", challenge.as_str()),
            ("response", response.as_str()),
        ];
        let connect_failed = || WidgetError::Invalid("Could not connect to the CAPTCHA service.".into());
        let client = reqwest::Client::builder().timeout(self.timeout).build().map_err(|e| {
            warn!(target: "widgets", "recaptcha client build failed: {e}");
            connect_failed()
        })?;
        let resp = client.post(&self.url).form(&params).send().await.map_err(|e| {
            warn!(target: "widgets", "recaptcha verify failed: {e}");
            connect_failed()
        })?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(WidgetError::Invalid(format!(
                "There was an error talking to the reCAPTCHA server{}",
                status.as_u16()
            )));
        }
        let content = resp.text().await.map_err(|_| connect_failed())?;
        let (valid, reason) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        if valid.trim() != "true" {
            let reason = match reason.trim() {
                "incorrect-captcha-sol" => "Please retry and enter the characters you see below.".to_string(),
                other => other.replace("\\n", " ").trim_matches('\'').to_string(),
            };
            debug!(target: "widgets", reason = %reason, "recaptcha rejected");
            return Err(WidgetError::Invalid(reason));
        }
        Ok(Some(pstruct))
    }
}
