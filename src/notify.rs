//! Alert formatting and SMTP delivery.
//!
//! Delivery is best-effort with zero retries: a failed send is logged by the
//! consumer and the event stays handled (already logged and evidenced).
//! Missing addressing is a configuration problem, reported distinctly from a
//! transport failure so operators can tell suppression from an outage.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;

use crate::error::PipelineError;
use crate::{Classification, DetectionEvent, EventSource};

/// A fully formatted outbound alert.
#[derive(Clone, Debug)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    /// `(filename, bytes)` in attachment order.
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// What the notifier did with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryReport {
    Sent { attachments: usize },
    /// Notification policy said no for this classification.
    Suppressed(&'static str),
}

/// Transport seam. The production implementation speaks SMTP; tests plug in
/// a recording mock.
pub trait Mailer: Send {
    fn send(&self, message: &AlertMessage) -> Result<(), PipelineError>;
}

/// SMTP settings as they appear in the daemon config.
#[derive(Clone, Debug, Default)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: String,
    pub password: String,
    pub recipient: String,
    pub notify_authorized: bool,
    pub notify_unauthorized: bool,
}

/// Blocking SMTP mailer.
#[derive(Debug)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpMailer {
    /// Fails with [`PipelineError::Configuration`] when addressing is absent
    /// or unparsable; nothing is retried later.
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, PipelineError> {
        if settings.recipient.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "email recipient not configured".to_string(),
            ));
        }
        if settings.sender.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "email sender not configured".to_string(),
            ));
        }
        let sender: Mailbox = settings
            .sender
            .parse()
            .map_err(|e| PipelineError::Configuration(format!("invalid sender address: {}", e)))?;
        let recipient: Mailbox = settings.recipient.parse().map_err(|e| {
            PipelineError::Configuration(format!("invalid recipient address: {}", e))
        })?;

        let transport = SmtpTransport::starttls_relay(&settings.smtp_host)
            .map_err(|e| PipelineError::Configuration(format!("smtp relay setup: {}", e)))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.sender.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            sender,
            recipient,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &AlertMessage) -> Result<(), PipelineError> {
        let mut multipart =
            MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
        for (filename, bytes) in &message.attachments {
            multipart = multipart.singlepart(
                Attachment::new(filename.clone())
                    .body(bytes.clone(), content_type_for(filename)),
            );
        }

        let email = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(&message.subject)
            .multipart(multipart)
            .map_err(|e| PipelineError::Delivery(format!("message build: {}", e)))?;

        self.transport
            .send(&email)
            .map_err(|e| PipelineError::Delivery(format!("smtp send: {}", e)))?;
        Ok(())
    }
}

fn content_type_for(filename: &str) -> ContentType {
    let guessed = match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("mjpeg") => "video/x-motion-jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    };
    ContentType::parse(guessed).unwrap_or(ContentType::TEXT_PLAIN)
}

/// Policy layer above the transport: decides whether an event is notified,
/// formats it, and gathers whichever artifacts exist.
pub struct Notifier {
    mailer: Box<dyn Mailer>,
    notify_authorized: bool,
    notify_unauthorized: bool,
}

impl Notifier {
    pub fn new(mailer: Box<dyn Mailer>, notify_authorized: bool, notify_unauthorized: bool) -> Self {
        Self {
            mailer,
            notify_authorized,
            notify_unauthorized,
        }
    }

    pub fn notify(&self, event: &DetectionEvent) -> Result<DeliveryReport, PipelineError> {
        let wanted = match event.classification() {
            Classification::Authorized => self.notify_authorized,
            Classification::Unauthorized => self.notify_unauthorized,
        };
        if !wanted {
            return Ok(DeliveryReport::Suppressed("classification not notified"));
        }

        let message = format_alert(event);
        let attachments = message.attachments.len();
        self.mailer.send(&message)?;
        Ok(DeliveryReport::Sent { attachments })
    }
}

/// Subject and body driven by classification and source; artifact files are
/// read at send time so a file deleted since assembly just drops off.
pub fn format_alert(event: &DetectionEvent) -> AlertMessage {
    let origin = match event.source {
        EventSource::LocalCamera => "camera",
        EventSource::RemoteSensor => "remote sensor",
    };
    let subject = match event.classification() {
        Classification::Unauthorized => {
            format!("SECURITY ALERT: unauthorized person ({})", origin)
        }
        Classification::Authorized => {
            format!("Security notice: {} detected ({})", event.decision.subject_name(), origin)
        }
    };

    let mut body = format!(
        "Event {}\nTime: {}\nSource: {}\nClassification: {}\nSubject: {}\nConfidence: {:.0}%\n",
        event.id,
        event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
        event.source,
        event.classification(),
        event.decision.subject_name(),
        (event.confidence() * 100.0).round()
    );

    let mut attachments = Vec::new();
    if let Some(bundle) = &event.evidence {
        for path in bundle.paths() {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "artifact".to_string());
                    attachments.push((name, bytes));
                }
                Err(err) => {
                    log::warn!("skipping unreadable attachment {}: {}", path.display(), err)
                }
            }
        }
        if bundle.is_empty() {
            body.push_str("No evidence artifacts were produced for this event.\n");
        }
    } else {
        body.push_str("No local evidence exists for this event.\n");
    }

    AlertMessage {
        subject,
        body,
        attachments,
    }
}
