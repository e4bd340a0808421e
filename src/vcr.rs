//! Record/replay of cloud API traffic.
//!
//! A test brackets its network calls with a scenario: [`VcrRecorder::new_with`]
//! starts it (loading the cassette in playback), [`VcrRecorder::save`] ends it
//! (writing the cassette in record mode). [`ScenarioGuard`] ties the two
//! together so a scenario is always saved, even when the test bails out early.
//!
//! Cassettes are JSON files named `<test_name>.json` under the cassette dir.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub const VCR_ENV_MODE: &str = "VCR_MODE";
pub const VCR_ENV_DIR: &str = "VCR_CASSETTE_DIR";
pub const CASSETTE_VERSION: &str = "1.0";

/// Record/replay mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcrMode {
    /// Call the live API and record every exchange.
    Record,
    /// Serve every exchange from the cassette.
    #[default]
    Playback,
    /// Play back when a cassette exists, record otherwise.
    Auto,
}

impl VcrMode {
    /// Parse `record` / `playback` / `auto` (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "record" => Some(Self::Record),
            "playback" | "replay" => Some(Self::Playback),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

impl RecordedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            body_text: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Matching key: method, url and a sha256 of the body. Headers are ignored
    /// so credentials and dates never affect matching.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(body) = &self.body {
            hasher.update(body.to_string().as_bytes());
        }
        if let Some(text) = &self.body_text {
            hasher.update(text.as_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            let _ = write!(hex, "{byte:02x}");
        }
        format!("{} {} {hex}", self.method.to_ascii_uppercase(), self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body_chunks: Vec<String>,
}

impl RecordedResponse {
    #[must_use]
    pub fn body(&self) -> String {
        self.body_chunks.concat()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    pub version: String,
    pub test_name: String,
    pub recorded_at: String,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Cassette {
    #[must_use]
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            version: CASSETTE_VERSION.to_string(),
            test_name: test_name.into(),
            recorded_at: chrono::Utc::now()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            interactions: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug)]
struct Session {
    cassette: Cassette,
    used: Vec<bool>,
    saved: bool,
}

/// One active scenario.
///
/// The session lock is never held across a live call, so `live` may use the
/// same recorder again.
#[derive(Debug)]
pub struct VcrRecorder {
    mode: VcrMode,
    path: PathBuf,
    recording: bool,
    session: Mutex<Session>,
}

impl VcrRecorder {
    /// Start scenario `test_name`. Playback without a cassette is an error.
    pub fn new_with(test_name: &str, mode: VcrMode, cassette_dir: &Path) -> Result<Self> {
        let path = cassette_dir.join(format!("{test_name}.json"));
        let recording = match mode {
            VcrMode::Record => true,
            VcrMode::Playback => false,
            VcrMode::Auto => !path.exists(),
        };
        let cassette = if recording {
            Cassette::new(test_name)
        } else {
            Cassette::load(&path).map_err(|err| {
                Error::vcr(format!("cannot load cassette {}: {err}", path.display()))
            })?
        };
        info!(
            scenario = test_name,
            ?mode,
            recording,
            interactions = cassette.interactions.len(),
            "vcr scenario started"
        );
        let used = vec![false; cassette.interactions.len()];
        Ok(Self {
            mode,
            path,
            recording,
            session: Mutex::new(Session {
                cassette,
                used,
                saved: false,
            }),
        })
    }

    #[must_use]
    pub const fn mode(&self) -> VcrMode {
        self.mode
    }

    #[must_use]
    pub fn cassette_path(&self) -> &Path {
        &self.path
    }

    /// Whether this scenario is talking to the live API.
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Waits can be skipped when traffic is replayed.
    #[must_use]
    pub const fn should_retry_immediately(&self) -> bool {
        !self.is_recording()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Perform one exchange.
    ///
    /// While recording, `live` performs the call and the pair is appended to the
    /// cassette once it completes, so concurrent calls are recorded in
    /// completion order. In playback, the first unused interaction with the
    /// same fingerprint is returned and `live` is never called.
    pub fn exchange<F>(&self, request: &RecordedRequest, live: F) -> Result<RecordedResponse>
    where
        F: FnOnce(&RecordedRequest) -> Result<RecordedResponse>,
    {
        if self.session().saved {
            return Err(Error::vcr("scenario already saved"));
        }

        if self.recording {
            let response = live(request)?;
            let mut session = self.session();
            if session.saved {
                return Err(Error::vcr("scenario saved while a live call was in flight"));
            }
            session.cassette.interactions.push(Interaction {
                request: request.clone(),
                response: response.clone(),
            });
            session.used.push(true);
            debug!(request = %request.fingerprint(), status = response.status, "vcr recorded");
            return Ok(response);
        }

        let mut session = self.session();
        let fingerprint = request.fingerprint();
        let Session { cassette, used, .. } = &mut *session;
        let found = cassette
            .interactions
            .iter()
            .enumerate()
            .find(|(i, interaction)| !used[*i] && interaction.request.fingerprint() == fingerprint)
            .map(|(i, interaction)| (i, interaction.response.clone()));
        match found {
            Some((index, response)) => {
                used[index] = true;
                debug!(request = %fingerprint, status = response.status, "vcr replayed");
                Ok(response)
            }
            None => Err(Error::vcr(format!(
                "no recorded interaction for {fingerprint} in {}",
                self.path.display()
            ))),
        }
    }

    /// End the scenario. Writes the cassette when recording; idempotent.
    pub fn save(&self) -> Result<()> {
        let mut session = self.session();
        if session.saved {
            return Ok(());
        }
        session.saved = true;
        if self.recording {
            session.cassette.save(&self.path)?;
            info!(path = %self.path.display(), interactions = session.cassette.interactions.len(), "vcr cassette saved");
        }
        Ok(())
    }
}

/// Saves its scenario when dropped.
#[derive(Debug)]
pub struct ScenarioGuard {
    recorder: VcrRecorder,
}

impl ScenarioGuard {
    /// Start a scenario that is saved on drop.
    pub fn start(test_name: &str, mode: VcrMode, cassette_dir: &Path) -> Result<Self> {
        Ok(Self {
            recorder: VcrRecorder::new_with(test_name, mode, cassette_dir)?,
        })
    }

    #[must_use]
    pub const fn recorder(&self) -> &VcrRecorder {
        &self.recorder
    }

    /// Save explicitly and surface any error instead of logging it on drop.
    pub fn finish(self) -> Result<()> {
        self.recorder.save()
    }
}

impl Drop for ScenarioGuard {
    fn drop(&mut self) {
        if let Err(err) = self.recorder.save() {
            tracing::warn!("failed to save vcr scenario: {err}");
        }
    }
}
