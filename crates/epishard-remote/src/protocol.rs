//! Wire protocol for remote integration.
//!
//! Every message is one frame: a big-endian `u32` body length followed by a
//! JSON body. One connection carries any number of request/response pairs,
//! strictly alternating.
//!
//! ```text
//! {"op":"integrate","params":{...}}
//! {"op":"peak_infected","params":{...}}
//!
//! {"status":"trajectory","rows":[[...],...],"step_size":0.01,"server_elapsed_ms":12.5}
//! {"status":"peak","value":1234.5,"server_elapsed_ms":3.1}
//! {"status":"error","message":"..."}
//! ```

use epishard_core::{EpiError, ModelParameters, Trajectory};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{RemoteError, Result};

/// Largest accepted frame body unless configured otherwise (64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Parameter record as it travels on the wire. `step_count` is a signed
/// 32-bit integer here and checked on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireParameters {
    pub total_population: f64,
    pub transmission_rate: f64,
    pub recovery_rate: f64,
    pub initial_infected: f64,
    pub initial_recovered: f64,
    pub horizon: f64,
    pub step_count: i32,
}

impl TryFrom<&ModelParameters> for WireParameters {
    type Error = RemoteError;

    fn try_from(params: &ModelParameters) -> Result<Self> {
        let step_count = i32::try_from(params.step_count).map_err(|_| {
            RemoteError::Protocol(format!(
                "step_count {} does not fit the wire format",
                params.step_count
            ))
        })?;
        Ok(Self {
            total_population: params.total_population,
            transmission_rate: params.transmission_rate,
            recovery_rate: params.recovery_rate,
            initial_infected: params.initial_infected,
            initial_recovered: params.initial_recovered,
            horizon: params.horizon,
            step_count,
        })
    }
}

impl TryFrom<WireParameters> for ModelParameters {
    type Error = EpiError;

    fn try_from(wire: WireParameters) -> std::result::Result<Self, EpiError> {
        let step_count = u32::try_from(wire.step_count).map_err(|_| {
            EpiError::InvalidParameters(format!(
                "step_count must be >= 2, got {}",
                wire.step_count
            ))
        })?;
        Ok(ModelParameters::new(
            wire.total_population,
            wire.transmission_rate,
            wire.recovery_rate,
            wire.initial_infected,
            wire.initial_recovered,
            wire.horizon,
            step_count,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Integrate { params: WireParameters },
    PeakInfected { params: WireParameters },
}

impl Request {
    pub fn integrate(params: &ModelParameters) -> Result<Self> {
        Ok(Request::Integrate {
            params: params.try_into()?,
        })
    }

    pub fn peak_infected(params: &ModelParameters) -> Result<Self> {
        Ok(Request::PeakInfected {
            params: params.try_into()?,
        })
    }

    pub fn op(&self) -> &'static str {
        match self {
            Request::Integrate { .. } => "integrate",
            Request::PeakInfected { .. } => "peak_infected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Trajectory {
        rows: Vec<Vec<f64>>,
        step_size: f64,
        server_elapsed_ms: f64,
    },
    Peak {
        value: f64,
        server_elapsed_ms: f64,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn trajectory(trajectory: Trajectory, server_elapsed_ms: f64) -> Self {
        let step_size = trajectory.step_size();
        Response::Trajectory {
            rows: trajectory.into_rows(),
            step_size,
            server_elapsed_ms,
        }
    }

    pub fn error(err: &dyn std::fmt::Display) -> Self {
        Response::Error {
            message: err.to_string(),
        }
    }

    /// JSON has no encoding for NaN or infinities; serde_json would emit
    /// `null` and the peer could not decode the frame.
    pub fn ensure_finite(self) -> Result<Self> {
        let finite = match &self {
            Response::Trajectory {
                rows,
                step_size,
                server_elapsed_ms,
            } => {
                step_size.is_finite()
                    && server_elapsed_ms.is_finite()
                    && rows.iter().flatten().all(|v| v.is_finite())
            }
            Response::Peak {
                value,
                server_elapsed_ms,
            } => value.is_finite() && server_elapsed_ms.is_finite(),
            Response::Error { .. } => true,
        };
        if finite {
            Ok(self)
        } else {
            Err(RemoteError::Service(
                "result contains a non-finite value and cannot be encoded".to_string(),
            ))
        }
    }
}

/// Lower bound on the encoded size of a trajectory body: every JSON number
/// takes at least three bytes (`0.0`) and every row at least its brackets and
/// separators.
pub fn min_trajectory_bytes(rows: usize, compartments: usize) -> usize {
    rows.saturating_mul(compartments.saturating_mul(4).saturating_add(1))
}

/// Read one frame. `Ok(None)` means the peer closed the connection cleanly
/// before starting a new frame.
pub async fn read_frame<R, M>(io: &mut R, max_frame_bytes: usize) -> Result<Option<M>>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match io.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(RemoteError::Protocol(format!(
            "frame of {len} bytes exceeds limit of {max_frame_bytes}"
        )));
    }

    let mut body = vec![0u8; len];
    io.read_exact(&mut body).await?;
    let message = serde_json::from_slice(&body)
        .map_err(|e| RemoteError::Protocol(format!("malformed frame body: {e}")))?;
    Ok(Some(message))
}

/// Write one frame and flush it.
pub async fn write_frame<W, M>(io: &mut W, message: &M, max_frame_bytes: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > max_frame_bytes || body.len() > u32::MAX as usize {
        return Err(RemoteError::Protocol(format!(
            "frame of {} bytes exceeds limit of {max_frame_bytes}",
            body.len()
        )));
    }

    io.write_all(&(body.len() as u32).to_be_bytes()).await?;
    io.write_all(&body).await?;
    io.flush().await?;
    Ok(())
}
