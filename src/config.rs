use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureConfig;
use crate::evidence::EvidenceDirs;
use crate::ingress::IngressConfig;
use crate::notify::EmailSettings;

const DEFAULT_CAPTURE_URL: &str = "stub://front_door";
const DEFAULT_CAPTURE_FPS: u32 = 15;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_BUFFER_SECONDS: u32 = 10;
const DEFAULT_CLIP_SECONDS: u32 = 20;
const DEFAULT_COOLDOWN_SECONDS: u32 = 3;
const DEFAULT_INGRESS_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_EVIDENCE_ROOT: &str = "evidence";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct SentineldConfigFile {
    capture: Option<CaptureConfigFile>,
    buffer_seconds: Option<u32>,
    clip_duration_seconds: Option<u32>,
    cooldown_seconds: Option<u32>,
    ingress: Option<IngressConfigFile>,
    evidence_root: Option<PathBuf>,
    email: Option<EmailConfigFile>,
    poll_interval_ms: Option<u64>,
    queue_capacity: Option<usize>,
    retention_days: Option<u32>,
    event_log: Option<PathBuf>,
    roster: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct IngressConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EmailConfigFile {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    sender: Option<String>,
    password: Option<String>,
    recipient: Option<String>,
    notify_authorized: Option<bool>,
    notify_unauthorized: Option<bool>,
}

/// Daemon configuration: optional JSON file named by `SENTINEL_CONFIG`,
/// overlaid with per-field environment variables, then validated.
#[derive(Debug, Clone)]
pub struct SentineldConfig {
    pub capture: CaptureConfig,
    pub min_confidence: f32,
    pub buffer_seconds: u32,
    pub clip_duration_seconds: u32,
    pub cooldown_seconds: u32,
    pub ingress: IngressConfig,
    pub evidence_root: PathBuf,
    pub email: EmailSettings,
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    pub retention_days: u32,
    pub event_log: PathBuf,
    pub roster: Vec<String>,
}

impl SentineldConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentineldConfigFile) -> Self {
        let capture = CaptureConfig {
            url: file
                .capture
                .as_ref()
                .and_then(|capture| capture.url.clone())
                .unwrap_or_else(|| DEFAULT_CAPTURE_URL.to_string()),
            fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.fps)
                .unwrap_or(DEFAULT_CAPTURE_FPS),
            width: file
                .capture
                .as_ref()
                .and_then(|capture| capture.width)
                .unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: file
                .capture
                .as_ref()
                .and_then(|capture| capture.height)
                .unwrap_or(DEFAULT_CAPTURE_HEIGHT),
        };
        let min_confidence = file
            .capture
            .as_ref()
            .and_then(|capture| capture.min_confidence)
            .unwrap_or(DEFAULT_MIN_CONFIDENCE);
        let ingress = IngressConfig {
            addr: file
                .ingress
                .as_ref()
                .and_then(|ingress| ingress.addr.clone())
                .unwrap_or_else(|| DEFAULT_INGRESS_ADDR.to_string()),
        };
        let evidence_root = file
            .evidence_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_ROOT));
        let email = EmailSettings {
            smtp_host: file
                .email
                .as_ref()
                .and_then(|email| email.smtp_host.clone())
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port: file
                .email
                .as_ref()
                .and_then(|email| email.smtp_port)
                .unwrap_or(DEFAULT_SMTP_PORT),
            sender: file
                .email
                .as_ref()
                .and_then(|email| email.sender.clone())
                .unwrap_or_default(),
            password: file
                .email
                .as_ref()
                .and_then(|email| email.password.clone())
                .unwrap_or_default(),
            recipient: file
                .email
                .as_ref()
                .and_then(|email| email.recipient.clone())
                .unwrap_or_default(),
            notify_authorized: file
                .email
                .as_ref()
                .and_then(|email| email.notify_authorized)
                .unwrap_or(false),
            notify_unauthorized: file
                .email
                .as_ref()
                .and_then(|email| email.notify_unauthorized)
                .unwrap_or(true),
        };
        let event_log = file
            .event_log
            .unwrap_or_else(|| evidence_root.join("detection_logs.jsonl"));
        Self {
            capture,
            min_confidence,
            buffer_seconds: file.buffer_seconds.unwrap_or(DEFAULT_BUFFER_SECONDS),
            clip_duration_seconds: file
                .clip_duration_seconds
                .unwrap_or(DEFAULT_CLIP_SECONDS),
            cooldown_seconds: file.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS),
            ingress,
            evidence_root,
            email,
            poll_interval_ms: file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            queue_capacity: file.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            retention_days: file.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            event_log,
            roster: file.roster.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTINEL_CAPTURE_URL") {
            if !url.trim().is_empty() {
                self.capture.url = url;
            }
        }
        if let Ok(addr) = std::env::var("SENTINEL_INGRESS_ADDR") {
            if !addr.trim().is_empty() {
                self.ingress.addr = addr;
            }
        }
        if let Ok(root) = std::env::var("SENTINEL_EVIDENCE_ROOT") {
            if !root.trim().is_empty() {
                let root = PathBuf::from(root);
                // Keep a defaulted log path inside the overridden root.
                if self.event_log == self.evidence_root.join("detection_logs.jsonl") {
                    self.event_log = root.join("detection_logs.jsonl");
                }
                self.evidence_root = root;
            }
        }
        if let Ok(recipient) = std::env::var("SENTINEL_EMAIL_RECIPIENT") {
            if !recipient.trim().is_empty() {
                self.email.recipient = recipient;
            }
        }
        if let Ok(password) = std::env::var("SENTINEL_SMTP_PASSWORD") {
            if !password.is_empty() {
                self.email.password = password;
            }
        }
        if let Ok(roster) = std::env::var("SENTINEL_ROSTER") {
            let parsed = split_csv(&roster);
            if !parsed.is_empty() {
                self.roster = parsed;
            }
        }
        if let Ok(days) = std::env::var("SENTINEL_RETENTION_DAYS") {
            let days: u32 = days
                .parse()
                .map_err(|_| anyhow!("SENTINEL_RETENTION_DAYS must be an integer number of days"))?;
            self.retention_days = days;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        if self.buffer_seconds == 0 {
            return Err(anyhow!("buffer_seconds must be greater than zero"));
        }
        if self.clip_duration_seconds == 0 {
            return Err(anyhow!("clip_duration_seconds must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!("min_confidence must be between 0 and 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be greater than zero"));
        }
        if self.retention_days == 0 {
            return Err(anyhow!("retention_days must be greater than zero"));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds as u64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention_age(&self) -> Duration {
        Duration::from_secs(self.retention_days as u64 * 24 * 60 * 60)
    }

    pub fn evidence_dirs(&self) -> EvidenceDirs {
        EvidenceDirs::under(&self.evidence_root)
    }
}

fn read_config_file(path: &Path) -> Result<SentineldConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
