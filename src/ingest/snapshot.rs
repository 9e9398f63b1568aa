//! Still-image sources: HTTP snapshot endpoints and local image files.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Upper bound on a snapshot body.
const MAX_SNAPSHOT_BYTES: u64 = 32 * 1024 * 1024;

/// GET `url` and decode the body (JPEG or PNG) as one frame.
pub fn fetch_snapshot(url: &str, timeout: Duration) -> Result<RgbImage> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_SNAPSHOT_BYTES)
        .read_to_end(&mut bytes)
        .context("read snapshot body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot from {}", url));
    }
    decode_frame(&bytes).with_context(|| format!("decode snapshot from {}", url))
}

/// Load a still image from disk.
pub fn load_file(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?;
    Ok(image.into_rgb8())
}

fn decode_frame(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::{BufRead, BufReader, Cursor, Write};
    use std::net::TcpListener;
    use std::thread;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Answer a single GET with `body`.
    fn serve_body(status: &'static str, body: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.trim_end().is_empty() {
                    break;
                }
            }
            let mut stream = stream;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
        });
        port
    }

    #[test]
    fn snapshot_is_fetched_and_decoded() -> Result<()> {
        let image = RgbImage::from_pixel(5, 4, Rgb([90, 120, 150]));
        let port = serve_body("200 OK", png_bytes(&image));
        let frame = fetch_snapshot(
            &format!("http://127.0.0.1:{}/snapshot.png", port),
            Duration::from_secs(5),
        )?;
        assert_eq!(frame, image);
        Ok(())
    }

    #[test]
    fn http_error_is_reported() {
        let port = serve_body("404 Not Found", Vec::new());
        let err = fetch_snapshot(
            &format!("http://127.0.0.1:{}/missing", port),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("fetch snapshot"));
    }

    #[test]
    fn garbage_body_fails_to_decode() {
        let port = serve_body("200 OK", b"not an image".to_vec());
        let err = fetch_snapshot(
            &format!("http://127.0.0.1:{}/", port),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("decode snapshot"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file(&dir.path().join("nope.png")).is_err());
    }
}
