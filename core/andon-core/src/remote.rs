//! Unix-socket JSON-line client for the floor gateway.
//!
//! One request per connection; the gateway answers with a single JSON line.
//! Transport failures surface as `RemoteUnavailable` after one retry that
//! reuses the same request id, so the gateway can deduplicate an intent it
//! already applied. Gateway rejections are authoritative and never retried
//! here.

use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use andon_gateway_protocol::{
    codes, BatchOutcome, CycleIntent, EmergencyStopIntent, EndSessionIntent, ErrorInfo,
    MachineRow, Method, NewStopReason, Request, Response, SessionRow, SessionStartIntent,
    StatusChangeIntent, StopReasonRow, MAX_MESSAGE_BYTES, PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{AndonError, Result};
use crate::gateway::Gateway;

pub const SOCKET_ENV: &str = "ANDON_GATEWAY_SOCKET";
const SOCKET_DIR: &str = ".andon";
const SOCKET_NAME: &str = "gateway.sock";
const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

pub struct SocketGateway {
    socket_path: PathBuf,
}

impl SocketGateway {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Socket path from `ANDON_GATEWAY_SOCKET`, falling back to
    /// `~/.andon/gateway.sock`.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = env::var(SOCKET_ENV) {
            return Ok(Self::new(path));
        }
        let home = dirs::home_dir().ok_or_else(|| AndonError::RemoteUnavailable {
            context: "home directory not found for default socket path".to_string(),
        })?;
        Ok(Self::new(home.join(SOCKET_DIR).join(SOCKET_NAME)))
    }

    fn call(
        &self,
        method: Method,
        id: Option<String>,
        params: Option<Value>,
    ) -> Result<Option<Value>> {
        let request = Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id,
            params,
        };

        let response = match self.request_once(&request) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, ?method, "gateway round-trip failed, retrying once");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                self.request_once(&request)?
            }
        };

        if response.ok {
            Ok(response.data)
        } else {
            let error = response
                .error
                .unwrap_or_else(|| ErrorInfo::new(codes::INTERNAL, "gateway reported no error"));
            Err(AndonError::Gateway {
                code: error.code,
                message: error.message,
            })
        }
    }

    /// Cheap liveness probe. `None` means the socket is unreachable,
    /// `Some(false)` a gateway that answered but is not healthy.
    pub fn health(&self) -> Option<bool> {
        let data = self.call(Method::GetHealth, None, None).ok()?;
        let status = data
            .as_ref()
            .and_then(|value| value.get("status"))
            .and_then(|value| value.as_str());
        Some(matches!(status, Some("ok")))
    }

    fn request_once(&self, request: &Request) -> Result<Response> {
        let mut stream =
            UnixStream::connect(&self.socket_path).map_err(|err| AndonError::RemoteUnavailable {
                context: format!("connect to gateway socket: {}", err),
            })?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

        serde_json::to_writer(&mut stream, request).map_err(|err| {
            AndonError::RemoteUnavailable {
                context: format!("write request: {}", err),
            }
        })?;
        stream
            .write_all(b"\n")
            .map_err(|err| AndonError::RemoteUnavailable {
                context: format!("flush request: {}", err),
            })?;
        stream.flush().ok();

        read_response(&mut stream)
    }
}

fn read_response(stream: &mut UnixStream) -> Result<Response> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_MESSAGE_BYTES {
                    return Err(AndonError::RemoteUnavailable {
                        context: "response exceeded maximum size".to_string(),
                    });
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(AndonError::RemoteUnavailable {
                    context: "timed out waiting for gateway response".to_string(),
                });
            }
            Err(err) => {
                return Err(AndonError::RemoteUnavailable {
                    context: format!("read response: {}", err),
                });
            }
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(AndonError::RemoteUnavailable {
            context: "gateway response was empty".to_string(),
        });
    }

    serde_json::from_slice(response_bytes).map_err(|err| AndonError::RemoteUnavailable {
        context: format!("parse response JSON: {}", err),
    })
}

fn decode<T: DeserializeOwned>(data: Option<Value>, what: &str) -> Result<T> {
    let value = data.ok_or_else(|| AndonError::RemoteUnavailable {
        context: format!("gateway returned no data for {}", what),
    })?;
    serde_json::from_value(value).map_err(|err| AndonError::RemoteUnavailable {
        context: format!("malformed {} payload: {}", what, err),
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| AndonError::RemoteUnavailable {
        context: format!("serialize request payload: {}", err),
    })
}

impl Gateway for SocketGateway {
    fn fetch_machines(&self, company_id: &str) -> Result<Vec<MachineRow>> {
        let data = self.call(
            Method::GetMachines,
            None,
            Some(json!({ "company_id": company_id })),
        )?;
        decode(data, "machine collection")
    }

    fn fetch_machines_for_operator(&self, operator_id: &str) -> Result<Vec<MachineRow>> {
        let data = self.call(
            Method::GetMachinesForOperator,
            None,
            Some(json!({ "operator_id": operator_id })),
        )?;
        decode(data, "machine collection")
    }

    fn fetch_stop_reasons(&self, company_id: &str) -> Result<Vec<StopReasonRow>> {
        let data = self.call(
            Method::GetStopReasons,
            None,
            Some(json!({ "company_id": company_id })),
        )?;
        decode(data, "stop reason collection")
    }

    fn create_stop_reason(&self, reason: &NewStopReason) -> Result<StopReasonRow> {
        let data = self.call(Method::CreateStopReason, None, Some(encode(reason)?))?;
        decode(data, "stop reason")
    }

    fn update_stop_reason(&self, reason: &StopReasonRow) -> Result<StopReasonRow> {
        let data = self.call(Method::UpdateStopReason, None, Some(encode(reason)?))?;
        decode(data, "stop reason")
    }

    fn delete_stop_reason(&self, company_id: &str, reason_id: &str) -> Result<()> {
        self.call(
            Method::DeleteStopReason,
            None,
            Some(json!({ "company_id": company_id, "reason_id": reason_id })),
        )?;
        Ok(())
    }

    fn get_or_create_stop_reason(&self, company_id: &str, name: &str) -> Result<StopReasonRow> {
        let data = self.call(
            Method::GetOrCreateStopReason,
            None,
            Some(json!({ "company_id": company_id, "name": name })),
        )?;
        decode(data, "stop reason")
    }

    fn fetch_sessions(&self, company_id: &str) -> Result<Vec<SessionRow>> {
        let data = self.call(
            Method::GetSessions,
            None,
            Some(json!({ "company_id": company_id })),
        )?;
        decode(data, "session collection")
    }

    fn start_session(&self, intent: &SessionStartIntent) -> Result<SessionRow> {
        let data = self
            .call(
                Method::StartSession,
                Some(intent.intent_id.clone()),
                Some(encode(intent)?),
            )
            .map_err(|err| match err {
                AndonError::Gateway { ref code, .. } if code == codes::SESSION_CONFLICT => {
                    AndonError::SessionConflict {
                        machine_id: intent.machine_id.clone(),
                        operator_id: intent.operator_id.clone(),
                    }
                }
                other => other,
            })?;
        decode(data, "session")
    }

    fn end_session(&self, intent: &EndSessionIntent) -> Result<BatchOutcome> {
        let data = self
            .call(
                Method::EndSession,
                Some(intent.intent_id.clone()),
                Some(encode(intent)?),
            )
            .map_err(|err| match err {
                AndonError::Gateway { ref code, .. } if code == codes::SESSION_NOT_FOUND => {
                    AndonError::SessionNotFound {
                        session_id: intent.session_id.clone(),
                    }
                }
                other => other,
            })?;
        decode(data, "batch outcome")
    }

    fn session_started_at(&self, machine_id: &str, operator_id: &str) -> Result<Option<String>> {
        #[derive(serde::Deserialize)]
        struct StartedAt {
            #[serde(default)]
            started_at: Option<String>,
        }

        let data = self.call(
            Method::GetSessionStart,
            None,
            Some(json!({ "machine_id": machine_id, "operator_id": operator_id })),
        )?;
        let payload: StartedAt = decode(data, "session start")?;
        Ok(payload.started_at)
    }

    fn submit_status_change(&self, intent: &StatusChangeIntent) -> Result<()> {
        self.call(
            Method::SubmitStatusChange,
            Some(intent.intent_id.clone()),
            Some(encode(intent)?),
        )?;
        Ok(())
    }

    fn submit_emergency_stop(&self, intent: &EmergencyStopIntent) -> Result<BatchOutcome> {
        let data = self.call(
            Method::SubmitEmergencyStop,
            Some(intent.intent_id.clone()),
            Some(encode(intent)?),
        )?;
        decode(data, "batch outcome")
    }

    fn submit_cycle(&self, intent: &CycleIntent) -> Result<()> {
        self.call(
            Method::SubmitCycle,
            Some(intent.intent_id.clone()),
            Some(encode(intent)?),
        )?;
        Ok(())
    }
}
