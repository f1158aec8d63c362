use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, WorkerError};
use crate::jobs::JobSummary;
use crate::paths::socket_path;
use crate::push::PushEvent;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub cmd: String,
    /// `update_build`: the serialized previous snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// `update_build`: who enqueued the job, for logs and the dead-letter file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// `subscribe`: the user whose events to receive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl WorkerRequest {
    pub fn command(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on a failed `update_build` once the job is in the dead-letter file.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dead_lettered: bool,
}

impl WorkerResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            dead_lettered: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            dead_lettered: false,
        }
    }

    pub fn dead_lettered(message: impl Into<String>) -> Self {
        Self {
            dead_lettered: true,
            ..Self::error(message)
        }
    }
}

fn connect(home: &Path) -> Result<UnixStream, WorkerError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(WorkerError::WorkerNotRunning { socket });
    }

    UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            WorkerError::WorkerNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })
}

fn write_line(stream: &mut UnixStream, home: &Path, request: &WorkerRequest) -> Result<(), WorkerError> {
    let socket = socket_path(home);
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))
}

fn read_response<R: BufRead>(reader: &mut R, home: &Path) -> Result<WorkerResponse, WorkerError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket_path(home), e))?;
    if read == 0 {
        return Err(WorkerError::Protocol(
            "worker closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Send one JSON request to the worker socket and return one response.
pub fn send_request(home: &Path, request: &WorkerRequest) -> Result<WorkerResponse, WorkerError> {
    let mut stream = connect(home)?;
    write_line(&mut stream, home, request)?;
    read_response(&mut BufReader::new(stream), home)
}

/// Worker status, waiting briefly for a worker that is still binding.
pub fn request_status(home: &Path) -> Result<Value, WorkerError> {
    let request = WorkerRequest::command("status");

    let mut last_not_running: Option<WorkerError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ WorkerError::WorkerNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        WorkerError::Protocol("worker status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), WorkerError> {
    let response = send_request(home, &WorkerRequest::command("stop"))?;
    response_into_data(response).map(|_| ())
}

/// Enqueue an update-build job and wait for its summary.
pub fn request_update_build(
    home: &Path,
    payload: String,
    source: &str,
) -> Result<JobSummary, WorkerError> {
    let request = WorkerRequest {
        payload: Some(payload),
        source: Some(source.to_string()),
        ..WorkerRequest::command("update_build")
    };
    let data = response_into_data(send_request(home, &request)?)?;
    Ok(serde_json::from_value(data)?)
}

/// Stream realtime events for `recipient` into `on_event` until it returns
/// `false` or the worker closes the connection.
pub fn subscribe<F>(home: &Path, recipient: &str, mut on_event: F) -> Result<(), WorkerError>
where
    F: FnMut(PushEvent) -> bool,
{
    let mut stream = connect(home)?;
    let request = WorkerRequest {
        recipient: Some(recipient.to_string()),
        ..WorkerRequest::command("subscribe")
    };
    write_line(&mut stream, home, &request)?;

    let mut reader = BufReader::new(stream);
    response_into_data(read_response(&mut reader, home)?)?;

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| io_err(socket_path(home), e))?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let event: PushEvent = serde_json::from_str(line.trim_end())?;
        if !on_event(event) {
            return Ok(());
        }
    }
}

fn response_into_data(response: WorkerResponse) -> Result<Value, WorkerError> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let message = response
        .error
        .unwrap_or_else(|| "unknown worker error".to_string());
    if response.dead_lettered {
        Err(WorkerError::JobDeadLettered(message))
    } else {
        Err(WorkerError::Protocol(message))
    }
}
