//! Tuya local-network protocol client (status queries only).
//!
//! Frames on the wire, all integers big endian:
//!
//! ```text
//! 0x000055AA | seq | cmd | len | payload | crc32 | 0x0000AA55
//! ```
//!
//! `len` counts the payload plus the trailing crc and suffix. Replies from
//! the device start their payload with a 4-byte return code. Protocol 3.3
//! encrypts JSON payloads with AES-128-ECB (PKCS#7) under the device's local
//! key and may prefix replies with a `3.3` version header; protocol 3.1
//! answers status queries in plain JSON.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{DataPoints, DeviceStatus};

pub const DEFAULT_PORT: u16 = 6668;
pub const DP_QUERY: u32 = 0x0A;

const PREFIX: u32 = 0x0000_55AA;
const SUFFIX: u32 = 0x0000_AA55;
const HEADER_LEN: usize = 16;
const TRAILER_LEN: usize = 8;
const VERSION_HEADER_LEN: usize = 15;
const MAX_FRAME_LEN: usize = 64 * 1024;
/// Replies read before giving up on a status answer.
const MAX_REPLIES: usize = 4;

/// Supported local protocol versions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "3.1")]
    V31,
    #[default]
    #[serde(rename = "3.3")]
    V33,
}

impl ProtocolVersion {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "3.1" => Ok(ProtocolVersion::V31),
            "3.3" => Ok(ProtocolVersion::V33),
            other => Err(anyhow!(
                "unsupported tuya protocol version {:?} (expected 3.1 or 3.3)",
                other
            )),
        }
    }

    fn tag(self) -> &'static [u8] {
        match self {
            ProtocolVersion::V31 => b"3.1",
            ProtocolVersion::V33 => b"3.3",
        }
    }
}

/// Device identity and connection parameters.
#[derive(Clone, Debug)]
pub struct TuyaConfig {
    pub device_id: String,
    pub address: String,
    pub local_key: String,
    pub version: ProtocolVersion,
    pub port: u16,
    pub timeout: Duration,
}

impl TuyaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(anyhow!("tuya device id must be set"));
        }
        if self.address.trim().is_empty() {
            return Err(anyhow!("tuya device address must be set"));
        }
        if self.local_key.len() != 16 {
            return Err(anyhow!(
                "tuya local key must be 16 bytes, got {}",
                self.local_key.len()
            ));
        }
        Ok(())
    }
}

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub seq: u32,
    pub cmd: u32,
    pub return_code: Option<u32>,
    pub payload: Vec<u8>,
}

/// Status client for a single device. A TCP connection is opened per query
/// and closed when the answer has been read.
pub struct TuyaDevice {
    config: TuyaConfig,
    seq: u32,
}

impl TuyaDevice {
    pub fn new(config: TuyaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, seq: 0 })
    }

    /// JSON body of a status query.
    pub fn query_payload(&self, unix_time: u64) -> Vec<u8> {
        let id = &self.config.device_id;
        serde_json::json!({
            "gwId": id,
            "devId": id,
            "uid": id,
            "t": unix_time.to_string(),
        })
        .to_string()
        .into_bytes()
    }

    /// Complete request frame for a status query.
    pub fn encode_query(&self, seq: u32, unix_time: u64) -> Result<Vec<u8>> {
        let json = self.query_payload(unix_time);
        let payload = match self.config.version {
            ProtocolVersion::V31 => json,
            ProtocolVersion::V33 => encrypt_ecb(self.config.local_key.as_bytes(), &json)?,
        };
        Ok(encode_frame(seq, DP_QUERY, &payload))
    }

    /// Turn a reply payload into the device's data points.
    pub fn decode_status(&self, payload: &[u8]) -> Result<DataPoints> {
        let mut body = payload;
        if body.starts_with(self.config.version.tag()) && body.len() >= VERSION_HEADER_LEN {
            body = &body[VERSION_HEADER_LEN..];
        }
        let plain = if body.first() == Some(&b'{') {
            body.to_vec()
        } else {
            match self.config.version {
                ProtocolVersion::V33 => decrypt_ecb(self.config.local_key.as_bytes(), body)
                    .context("decrypt device status")?,
                ProtocolVersion::V31 => {
                    return Err(anyhow!(
                        "unexpected device reply: {}",
                        String::from_utf8_lossy(body)
                    ))
                }
            }
        };

        let value: serde_json::Value = serde_json::from_slice(&plain).map_err(|_| {
            anyhow!(
                "device status is not JSON: {}",
                String::from_utf8_lossy(&plain)
            )
        })?;
        let dps = value
            .get("dps")
            .and_then(|dps| dps.as_object())
            .ok_or_else(|| anyhow!("device status has no dps map: {}", value))?;
        Ok(dps.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn socket_addr(&self) -> Result<SocketAddr> {
        (self.config.address.as_str(), self.config.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve tuya device {}", self.config.address))?
            .next()
            .ok_or_else(|| anyhow!("tuya device {} did not resolve", self.config.address))
    }
}

impl DeviceStatus for TuyaDevice {
    fn status(&mut self) -> Result<DataPoints> {
        let addr = self.socket_addr()?;
        let mut stream = TcpStream::connect_timeout(&addr, self.config.timeout)
            .with_context(|| format!("connect to tuya device {}", addr))?;
        stream.set_read_timeout(Some(self.config.timeout))?;
        stream.set_write_timeout(Some(self.config.timeout))?;

        self.seq = self.seq.wrapping_add(1);
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let request = self.encode_query(self.seq, now)?;
        stream
            .write_all(&request)
            .with_context(|| format!("send status query to {}", addr))?;

        for _ in 0..MAX_REPLIES {
            let frame = read_frame(&mut stream)
                .with_context(|| format!("read status reply from {}", addr))?;
            if let Some(code) = frame.return_code.filter(|code| *code != 0) {
                log::warn!("tuya device {} returned code {}", addr, code);
            }
            if frame.payload.is_empty() {
                continue;
            }
            return self.decode_status(&frame.payload);
        }
        Err(anyhow!("tuya device {} sent no status payload", addr))
    }
}

/// Build a frame around `payload`.
pub fn encode_frame(seq: u32, cmd: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    frame.extend_from_slice(&PREFIX.to_be_bytes());
    frame.extend_from_slice(&seq.to_be_bytes());
    frame.extend_from_slice(&cmd.to_be_bytes());
    frame.extend_from_slice(&((payload.len() + TRAILER_LEN) as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&SUFFIX.to_be_bytes());
    frame
}

/// Parse one complete frame from `bytes`.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(anyhow!("tuya frame too short: {} bytes", bytes.len()));
    }
    let word = |offset: usize| {
        u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };
    if word(0) != PREFIX {
        return Err(anyhow!("tuya frame has bad prefix {:#010x}", word(0)));
    }
    let len = word(12) as usize;
    if len < TRAILER_LEN || HEADER_LEN + len != bytes.len() {
        return Err(anyhow!(
            "tuya frame length mismatch: header says {}, got {}",
            len,
            bytes.len() - HEADER_LEN
        ));
    }
    let crc_offset = bytes.len() - TRAILER_LEN;
    if word(crc_offset + 4) != SUFFIX {
        return Err(anyhow!("tuya frame has bad suffix"));
    }
    let expected_crc = crc32fast::hash(&bytes[..crc_offset]);
    if word(crc_offset) != expected_crc {
        return Err(anyhow!("tuya frame crc mismatch"));
    }

    let mut payload = &bytes[HEADER_LEN..crc_offset];
    let mut return_code = None;
    // Device replies lead with a small return code; JSON or ciphertext never
    // starts with three zero bytes.
    if payload.len() >= 4 && payload[..3] == [0, 0, 0] {
        return_code = Some(u32::from_be_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]));
        payload = &payload[4..];
    }

    Ok(Frame {
        seq: word(4),
        cmd: word(8),
        return_code,
        payload: payload.to_vec(),
    })
}

fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes([header[12], header[13], header[14], header[15]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(anyhow!("tuya frame too large: {} bytes", len));
    }
    let mut bytes = header.to_vec();
    bytes.resize(HEADER_LEN + len, 0);
    reader.read_exact(&mut bytes[HEADER_LEN..])?;
    decode_frame(&bytes)
}

fn cipher(key: &[u8]) -> Result<Aes128> {
    Aes128::new_from_slice(key).map_err(|_| anyhow!("tuya local key must be 16 bytes"))
}

/// AES-128-ECB with PKCS#7 padding.
pub fn encrypt_ecb(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let pad = 16 - plaintext.len() % 16;
    let mut buf = plaintext.to_vec();
    buf.extend(std::iter::repeat(pad as u8).take(pad));
    for chunk in buf.chunks_exact_mut(16) {
        cipher.encrypt_block(aes::Block::from_mut_slice(chunk));
    }
    Ok(buf)
}

pub fn decrypt_ecb(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(anyhow!(
            "ciphertext length {} is not a multiple of 16",
            ciphertext.len()
        ));
    }
    let cipher = cipher(key)?;
    let mut buf = ciphertext.to_vec();
    for chunk in buf.chunks_exact_mut(16) {
        cipher.decrypt_block(aes::Block::from_mut_slice(chunk));
    }
    let pad = *buf.last().unwrap_or(&0) as usize;
    if pad == 0 || pad > 16 || buf[buf.len() - pad..].iter().any(|b| *b as usize != pad) {
        return Err(anyhow!("bad padding (wrong local key?)"));
    }
    buf.truncate(buf.len() - pad);
    Ok(buf)
}
