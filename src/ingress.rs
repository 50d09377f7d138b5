//! Inbound HTTP listener for remote detection reports.
//!
//! Hand-rolled request loop over a nonblocking `TcpListener`; no framework.
//! Remote edge devices POST pre-classified detections, which become
//! `RemoteSensor` events with no evidence bundle (no local frames exist for
//! them). Validation happens at this boundary: a malformed payload is
//! rejected with 400 and never enters the pipeline.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::dispatch::EventProducer;
use crate::error::PipelineError;
use crate::{
    Classification, ClassificationDecision, DetectionEvent, EventIdGen, EventSource,
};

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct IngressConfig {
    pub addr: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8790".to_string(),
        }
    }
}

/// Stop handle for a running listener. `stop` is idempotent through
/// ownership: it consumes the handle, flips the flag and joins.
#[derive(Debug)]
pub struct IngressHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl IngressHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("ingress listener thread panicked"))?;
        }
        Ok(())
    }
}

pub struct IngressServer {
    cfg: IngressConfig,
    producer: EventProducer,
}

impl IngressServer {
    pub fn new(cfg: IngressConfig, producer: EventProducer) -> Self {
        Self { cfg, producer }
    }

    pub fn spawn(self) -> Result<IngressHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "ingress configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let producer = self.producer;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_ingress(listener, producer, shutdown_thread) {
                log::error!("ingress listener stopped: {}", err);
            }
        });

        Ok(IngressHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_ingress(
    listener: TcpListener,
    producer: EventProducer,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut id_gen = EventIdGen::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &producer, &mut id_gen) {
                    log::warn!("ingress request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Wire payload posted by remote sensors.
#[derive(Debug, Deserialize)]
pub struct RemoteDetection {
    pub person_type: String,
    pub confidence: f32,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub person_name: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl RemoteDetection {
    /// Boundary validation. Unknown `person_type` and out-of-range
    /// confidence are rejected; the cooldown gate is not consulted for
    /// remote events (the remote device already debounced).
    pub fn validate(&self) -> Result<Classification, PipelineError> {
        let classification = match self.person_type.as_str() {
            "authorized" => Classification::Authorized,
            "unauthorized" => Classification::Unauthorized,
            other => {
                return Err(PipelineError::MalformedIngress(format!(
                    "unknown person_type '{}'",
                    other
                )))
            }
        };
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(PipelineError::MalformedIngress(format!(
                "confidence {} out of range",
                self.confidence
            )));
        }
        Ok(classification)
    }

    pub fn into_event(self, id_gen: &mut EventIdGen) -> Result<DetectionEvent, PipelineError> {
        let classification = self.validate()?;
        // Prefer the sender's timestamp; the event happened on the edge
        // device, not at receipt.
        let occurred_at = self
            .timestamp
            .as_deref()
            .and_then(parse_wire_timestamp)
            .unwrap_or_else(Local::now);
        Ok(DetectionEvent {
            id: id_gen.next(),
            source: EventSource::RemoteSensor,
            occurred_at,
            decision: ClassificationDecision {
                classification,
                subject: self.person_name,
                confidence: self.confidence,
            },
            evidence: None,
        })
    }
}

fn parse_wire_timestamp(raw: &str) -> Option<DateTime<Local>> {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        Ok(naive) => Local.from_local_datetime(&naive).single(),
        Err(err) => {
            log::warn!(
                "unparsable remote timestamp '{}', using receipt time: {}",
                raw,
                err
            );
            None
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    producer: &EventProducer,
    id_gen: &mut EventIdGen,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
            Ok(())
        }
        ("POST", "/detections") => {
            let detection: RemoteDetection = match serde_json::from_slice(&request.body) {
                Ok(detection) => detection,
                Err(err) => {
                    write_json_response(&mut stream, 400, r#"{"error":"invalid_json"}"#)?;
                    return Err(anyhow!(PipelineError::MalformedIngress(err.to_string())));
                }
            };
            let source_id = detection.source_id.clone();
            let event = match detection.into_event(id_gen) {
                Ok(event) => event,
                Err(err) => {
                    write_json_response(&mut stream, 400, r#"{"error":"invalid_detection"}"#)?;
                    return Err(err.into());
                }
            };
            log::info!(
                "remote detection accepted: {} {} from {}",
                event.classification(),
                event.id,
                source_id.as_deref().unwrap_or("unidentified sensor")
            );
            producer.enqueue(event);
            write_json_response(&mut stream, 200, r#"{"status":"received"}"#)?;
            Ok(())
        }
        ("POST", _) | ("GET", _) => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
            Ok(())
        }
        _ => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
            Ok(())
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .ok_or_else(|| anyhow!("truncated request"))?;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let header_text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let mut content_length = 0usize;
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case("content-length") {
                content_length = v.trim().parse().map_err(|_| anyhow!("bad content-length"))?;
            }
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("truncated request body"));
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request body too large"));
        }
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(person_type: &str, confidence: f32) -> RemoteDetection {
        RemoteDetection {
            person_type: person_type.to_string(),
            confidence,
            timestamp: None,
            person_name: None,
            source_id: None,
        }
    }

    #[test]
    fn known_person_types_validate() {
        assert_eq!(
            payload("authorized", 0.5).validate().unwrap(),
            Classification::Authorized
        );
        assert_eq!(
            payload("unauthorized", 1.0).validate().unwrap(),
            Classification::Unauthorized
        );
    }

    #[test]
    fn unknown_type_and_bad_confidence_are_rejected() {
        assert!(matches!(
            payload("visitor", 0.5).validate(),
            Err(PipelineError::MalformedIngress(_))
        ));
        assert!(payload("authorized", 1.5).validate().is_err());
        assert!(payload("authorized", -0.1).validate().is_err());
        assert!(payload("authorized", f32::NAN).validate().is_err());
    }

    #[test]
    fn event_carries_no_bundle_and_remote_source() {
        let mut id_gen = EventIdGen::new();
        let mut detection = payload("unauthorized", 0.77);
        detection.person_name = Some("gate-cam".to_string());
        let event = detection.into_event(&mut id_gen).unwrap();
        assert_eq!(event.source, EventSource::RemoteSensor);
        assert!(event.evidence.is_none());
        assert_eq!(event.decision.subject.as_deref(), Some("gate-cam"));
    }

    #[test]
    fn sender_timestamp_is_preserved() {
        let mut id_gen = EventIdGen::new();
        let mut detection = payload("unauthorized", 0.95);
        detection.timestamp = Some("2024-01-01 10:00:00".to_string());
        let event = detection.into_event(&mut id_gen).unwrap();
        assert_eq!(
            event.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-01 10:00:00"
        );
    }

    #[test]
    fn bad_timestamp_falls_back_to_receipt_time() {
        let mut id_gen = EventIdGen::new();
        let mut detection = payload("unauthorized", 0.95);
        detection.timestamp = Some("yesterdayish".to_string());
        let before = Local::now();
        let event = detection.into_event(&mut id_gen).unwrap();
        assert!(event.occurred_at >= before);
    }
}
