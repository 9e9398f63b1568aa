//! InfluxDB 1.x HTTP writer.
//!
//! Records are serialized to line protocol and posted to `/write` in one
//! request. Each call builds its own HTTP agent, so no connection outlives
//! the write. There is no retry and no local buffering: a refused write is
//! returned to the caller.

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::time::Duration;
use url::Url;

use super::RecordSink;
use crate::record::{to_line_protocol_batch, MeasurementRecord};

/// Connection parameters for an InfluxDB 1.x server.
#[derive(Clone, Debug)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Gzip request bodies.
    pub gzip: bool,
    pub use_tls: bool,
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8086,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            gzip: true,
            use_tls: false,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Writes records to InfluxDB over its HTTP write API.
#[derive(Clone, Debug)]
pub struct InfluxWriter {
    config: InfluxConfig,
}

impl InfluxWriter {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        if config.database.trim().is_empty() {
            return Err(anyhow!("influxdb database name must be set"));
        }
        if config.host.trim().is_empty() {
            return Err(anyhow!("influxdb host must be set"));
        }
        Ok(Self { config })
    }

    /// Full write endpoint including query parameters.
    pub fn write_url(&self) -> Result<Url> {
        let scheme = if self.config.use_tls { "https" } else { "http" };
        let mut url = Url::parse(&format!(
            "{}://{}:{}/write",
            scheme, self.config.host, self.config.port
        ))
        .with_context(|| format!("invalid influxdb address {}", self.config.host))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("db", &self.config.database);
            if !self.config.username.is_empty() {
                query.append_pair("u", &self.config.username);
                query.append_pair("p", &self.config.password);
            }
            query.append_pair("precision", "s");
        }
        Ok(url)
    }

    /// Request body, gzipped when configured.
    pub fn encode_body(&self, records: &[MeasurementRecord]) -> Result<Vec<u8>> {
        let lines = to_line_protocol_batch(records)?;
        if !self.config.gzip {
            return Ok(lines.into_bytes());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(lines.as_bytes())
            .context("gzip line protocol")?;
        encoder.finish().context("finish gzip stream")
    }
}

impl RecordSink for InfluxWriter {
    fn write(&self, records: &[MeasurementRecord]) -> Result<()> {
        let url = self.write_url()?;
        let body = self.encode_body(records)?;

        let agent = ureq::AgentBuilder::new()
            .timeout(self.config.timeout)
            .build();
        let mut request = agent
            .post(url.as_str())
            .set("Content-Type", "text/plain; charset=utf-8");
        if self.config.gzip {
            request = request.set("Content-Encoding", "gzip");
        }

        match request.send_bytes(&body) {
            Ok(response) => {
                log::debug!(
                    "influxdb accepted {} record(s) (status {})",
                    records.len(),
                    response.status()
                );
                Ok(())
            }
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Err(anyhow!(
                    "influxdb rejected write to {} (status {}): {}",
                    self.config.database,
                    code,
                    detail.trim()
                ))
            }
            Err(err) => Err(anyhow!(
                "influxdb unreachable at {}:{}: {}",
                self.config.host,
                self.config.port,
                err
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::io::{BufRead, BufReader, Read};
    use std::net::TcpListener;
    use std::thread;

    fn record() -> MeasurementRecord {
        MeasurementRecord::new("sensor_data", Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .with_field("temperature", 221i64)
    }

    fn config(port: u16, gzip: bool) -> InfluxConfig {
        InfluxConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: "lab".to_string(),
            password: "p@ss word".to_string(),
            database: "science_fair".to_string(),
            gzip,
            ..InfluxConfig::default()
        }
    }

    /// Accept one request, answer with `status`, hand back (request line, body).
    fn serve_once(status: &'static str) -> (u16, thread::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            std::io::Write::write_all(&mut stream, response.as_bytes()).unwrap();
            (request_line, body)
        });
        (port, handle)
    }

    #[test]
    fn write_url_carries_database_and_credentials() {
        let writer = InfluxWriter::new(config(8086, true)).unwrap();
        let url = writer.write_url().unwrap();
        assert_eq!(url.path(), "/write");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("db".to_string(), "science_fair".to_string())));
        assert!(pairs.contains(&("u".to_string(), "lab".to_string())));
        assert!(pairs.contains(&("p".to_string(), "p@ss word".to_string())));
        assert!(pairs.contains(&("precision".to_string(), "s".to_string())));
    }

    #[test]
    fn gzip_body_inflates_to_line_protocol() {
        let writer = InfluxWriter::new(config(8086, true)).unwrap();
        let body = writer.encode_body(&[record()]).unwrap();
        let mut text = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, "sensor_data temperature=221i 1704164645");
    }

    #[test]
    fn missing_database_is_rejected() {
        let mut cfg = config(8086, false);
        cfg.database.clear();
        assert!(InfluxWriter::new(cfg).is_err());
    }

    #[test]
    fn posts_records_to_write_endpoint() {
        let (port, server) = serve_once("204 No Content");
        let writer = InfluxWriter::new(config(port, false)).unwrap();
        writer.write(&[record()]).unwrap();

        let (request_line, body) = server.join().unwrap();
        assert!(request_line.starts_with("POST /write?db=science_fair"));
        assert_eq!(body, b"sensor_data temperature=221i 1704164645");
    }

    #[test]
    fn server_error_propagates() {
        let (port, server) = serve_once("500 Internal Server Error");
        let writer = InfluxWriter::new(config(port, true)).unwrap();
        let err = writer.write(&[record()]).unwrap_err();
        assert!(err.to_string().contains("status 500"));
        server.join().unwrap();
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let writer = InfluxWriter::new(config(port, false)).unwrap();
        assert!(writer.write(&[record()]).is_err());
    }
}
