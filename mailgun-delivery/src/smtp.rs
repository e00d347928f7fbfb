//! C7 SMTP Client: `send(hostname, envelope)`, issuing `MAIL FROM`,
//! `RCPT TO` per recipient, the message body, then `QUIT` (§4.7).
//! Non-goal per spec §1: no TLS/STARTTLS negotiation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mailgun_common::Envelope;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::SendError;

#[async_trait]
pub trait SmtpClient: Send + Sync {
    async fn send(&self, hostname: &str, envelope: &Envelope) -> Result<(), SendError>;
}

/// A scripted in-process stub for tests: each hostname is given a fixed
/// sequence of outcomes, replayed in order and held on the last entry
/// once exhausted. Also records every `MAIL FROM` it sees, so tests can
/// assert on what reached the "server" (S1, S2).
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Success,
    Temporary(&'static str),
    Permanent(&'static str),
}

#[derive(Debug, Default)]
pub struct StaticSmtpClient {
    scripts: HashMap<String, Vec<ScriptedOutcome>>,
    calls: Mutex<HashMap<String, usize>>,
    received: Mutex<Vec<(String, String)>>, // (hostname, sender)
}

impl StaticSmtpClient {
    #[must_use]
    pub fn new(scripts: HashMap<String, Vec<ScriptedOutcome>>) -> Self {
        Self {
            scripts,
            calls: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn always_succeeds() -> Self {
        Self::default()
    }

    /// `MAIL FROM` senders received, in call order, for assertions in
    /// tests (S1: "stub for a.com receives one MAIL FROM ...").
    pub fn received(&self) -> Vec<(String, String)> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmtpClient for StaticSmtpClient {
    async fn send(&self, hostname: &str, envelope: &Envelope) -> Result<(), SendError> {
        self.received
            .lock()
            .unwrap()
            .push((hostname.to_string(), envelope.sender.clone()));

        let Some(script) = self.scripts.get(hostname) else {
            return Ok(());
        };

        let mut calls = self.calls.lock().unwrap();
        let call_index = *calls.get(hostname).unwrap_or(&0);
        calls.insert(hostname.to_string(), call_index + 1);
        drop(calls);

        let outcome = script
            .get(call_index)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(ScriptedOutcome::Success);

        match outcome {
            ScriptedOutcome::Success => Ok(()),
            ScriptedOutcome::Temporary(reason) => Err(SendError::Temporary(reason.to_string())),
            ScriptedOutcome::Permanent(reason) => Err(SendError::Permanent(reason.to_string())),
        }
    }
}

/// The production SMTP client: a minimal, non-TLS conversation over TCP.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TcpSmtpClient {
    port: u16,
    helo_domain: String,
}

impl TcpSmtpClient {
    #[must_use]
    pub fn new(port: u16, helo_domain: impl Into<String>) -> Self {
        Self {
            port,
            helo_domain: helo_domain.into(),
        }
    }

    async fn read_response(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Result<(u16, String), SendError> {
        let mut line = String::new();
        tokio::time::timeout(COMMAND_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| SendError::Temporary("timed out waiting for SMTP response".into()))?
            .map_err(|err| SendError::Temporary(format!("connection error: {err}")))?;
        if line.len() < 3 {
            return Err(SendError::Temporary("truncated SMTP response".into()));
        }
        let code: u16 = line[..3]
            .parse()
            .map_err(|_| SendError::Temporary(format!("unparseable SMTP response: {line:?}")))?;
        Ok((code, line))
    }

    fn classify(code: u16, context: &str) -> Result<(), SendError> {
        match code {
            200..=299 => Ok(()),
            400..=499 => Err(SendError::Temporary(format!(
                "{context}: transient SMTP response {code}"
            ))),
            _ => Err(SendError::Permanent(format!(
                "{context}: SMTP response {code}"
            ))),
        }
    }
}

#[async_trait]
impl SmtpClient for TcpSmtpClient {
    async fn send(&self, hostname: &str, envelope: &Envelope) -> Result<(), SendError> {
        let stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((hostname, self.port)),
        )
        .await
        .map_err(|_| SendError::Temporary(format!("timed out connecting to {hostname}")))?
        .map_err(|err| SendError::Temporary(format!("could not connect to {hostname}: {err}")))?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        // Greeting
        let (code, _) = Self::read_response(&mut reader).await?;
        Self::classify(code, "greeting")?;

        async fn write(
            write_half: &mut tokio::net::tcp::OwnedWriteHalf,
            line: String,
        ) -> Result<(), SendError> {
            write_half
                .write_all(line.as_bytes())
                .await
                .map_err(|err| SendError::Temporary(format!("write failed: {err}")))
        }

        write(&mut write_half, format!("EHLO {}\r\n", self.helo_domain)).await?;
        let (code, _) = Self::read_response(&mut reader).await?;
        Self::classify(code, "EHLO")?;

        write(
            &mut write_half,
            format!("MAIL FROM:<{}>\r\n", envelope.sender),
        )
        .await?;
        let (code, _) = Self::read_response(&mut reader).await?;
        Self::classify(code, "MAIL FROM")?;

        for recipient in &envelope.recipients {
            write(&mut write_half, format!("RCPT TO:<{recipient}>\r\n")).await?;
            let (code, _) = Self::read_response(&mut reader).await?;
            Self::classify(code, "RCPT TO")?;
        }

        write(&mut write_half, "DATA\r\n".to_string()).await?;
        let (code, _) = Self::read_response(&mut reader).await?;
        Self::classify(code, "DATA")?;

        write(&mut write_half, format!("{}\r\n.\r\n", envelope.message)).await?;
        let (code, _) = Self::read_response(&mut reader).await?;
        Self::classify(code, "message body")?;

        write(&mut write_half, "QUIT\r\n".to_string()).await?;
        let _ = Self::read_response(&mut reader).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgun_common::{Domain, EnvelopeStatus};

    fn envelope() -> Envelope {
        Envelope {
            id: 1,
            client_id: "c1".into(),
            submission_id: "s1".into(),
            sender: "s@e2e-test.com".into(),
            recipients: vec!["u@a.com".into()],
            destination_domain: Domain::new("a.com"),
            message: "Subject: t\r\n\r\nhi".into(),
            status: EnvelopeStatus::Queued,
            next_attempt_at: 0,
            delivery_attempts: 0,
            being_processed: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn scripted_client_replays_outcomes_in_order() {
        let mut scripts = HashMap::new();
        scripts.insert(
            "mx1.a.com".to_string(),
            vec![
                ScriptedOutcome::Temporary("greylisted"),
                ScriptedOutcome::Success,
            ],
        );
        let client = StaticSmtpClient::new(scripts);

        assert!(client.send("mx1.a.com", &envelope()).await.is_err());
        assert!(client.send("mx1.a.com", &envelope()).await.is_ok());
        assert_eq!(client.received().len(), 2);
    }

    #[tokio::test]
    async fn default_stub_always_succeeds() {
        let client = StaticSmtpClient::always_succeeds();
        assert!(client.send("anything", &envelope()).await.is_ok());
    }
}
