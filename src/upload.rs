//! # Image Upload
//!
//! Encodes a captured image as JPEG in memory and POSTs it to the recognition
//! service. The response body is returned untouched; interpreting it is the
//! caller's business.
//!
//! ## Payload Conventions
//! - **Multipart** (default): `multipart/form-data` with the JPEG in a file
//!   field (`image` unless configured otherwise), as a Flask `request.files`
//!   endpoint expects
//! - **Raw JPEG**: the encoded bytes are the body, `Content-Type: image/jpeg`
//!
//! ## Error Handling
//! Every failure is classified so the log says which stage broke:
//! - **Encode**: the image could not be serialized
//! - **Transport**: the request never completed (DNS, refused, reset)
//! - **ReadResponse**: the server answered but the body could not be read
//! - **Rejected**: the server answered with a non-2xx status
//!
//! There is no retry and no timeout beyond the transport defaults. A failed
//! upload is reported and the next cycle carries on.

use crate::config::{PayloadFormat, UploadConfig};
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use reqwest::blocking::{multipart, Client};
use reqwest::header::CONTENT_TYPE;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur while sending an image
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to send image: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    ReadResponse(#[source] reqwest::Error),

    #[error("server rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl UploadError {
    /// Short failure class for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Encode(_) => "encode",
            UploadError::Transport(_) => "transport",
            UploadError::ReadResponse(_) => "read-response",
            UploadError::Rejected { .. } => "rejected",
        }
    }
}

/// Raw answer from the recognition service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl UploadResponse {
    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Something that can deliver one captured image per call.
pub trait Uploader {
    fn upload(&self, image: &DynamicImage) -> Result<UploadResponse, UploadError>;
}

impl<U: Uploader + ?Sized> Uploader for Box<U> {
    fn upload(&self, image: &DynamicImage) -> Result<UploadResponse, UploadError> {
        (**self).upload(image)
    }
}

/// Encode `image` as baseline JPEG at `quality` (1-100).
///
/// Alpha is discarded since JPEG cannot carry it.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, UploadError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
    Ok(buffer)
}

fn capture_file_name() -> String {
    format!("capture-{}.jpg", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Blocking HTTP uploader.
///
/// Must be created and used off the async runtime: `reqwest::blocking`
/// panics when driven from inside a tokio worker.
pub struct HttpUploadClient {
    client: Client,
    endpoint: String,
    format: PayloadFormat,
    field_name: String,
    jpeg_quality: u8,
}

impl HttpUploadClient {
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder().build().map_err(UploadError::Transport)?;
        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured client (proxy settings, TLS roots)
    pub fn with_client(client: Client, config: &UploadConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            format: config.format,
            field_name: config.field_name.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Uploader for HttpUploadClient {
    fn upload(&self, image: &DynamicImage) -> Result<UploadResponse, UploadError> {
        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        log::debug!(
            "Encoded {}x{} image into {} bytes",
            image.width(),
            image.height(),
            jpeg.len()
        );

        let request = match self.format {
            PayloadFormat::Multipart => {
                let part = multipart::Part::bytes(jpeg)
                    .file_name(capture_file_name())
                    .mime_str("image/jpeg")
                    .map_err(UploadError::Transport)?;
                let form = multipart::Form::new().part(self.field_name.clone(), part);
                self.client.post(&self.endpoint).multipart(form)
            }
            PayloadFormat::RawJpeg => self
                .client
                .post(&self.endpoint)
                .header(CONTENT_TYPE, "image/jpeg")
                .body(jpeg),
        };

        let response = request.send().map_err(UploadError::Transport)?;
        let status = response.status();
        let body = response.bytes().map_err(UploadError::ReadResponse)?.to_vec();

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(UploadResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// What the stub server saw
    struct Captured {
        content_type: String,
        body: Vec<u8>,
    }

    /// One-shot HTTP server answering with `status` and `reply`.
    fn stub_server(
        status: &'static str,
        reply: &'static str,
    ) -> (String, mpsc::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/predict", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_type = String::new();
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    match name.to_ascii_lowercase().as_str() {
                        "content-type" => content_type = value.trim().to_string(),
                        "content-length" => content_length = value.trim().parse().unwrap(),
                        "transfer-encoding" => chunked = value.trim() == "chunked",
                        _ => {}
                    }
                }
            }
            let mut body = Vec::new();
            if chunked {
                loop {
                    let mut size = String::new();
                    reader.read_line(&mut size).unwrap();
                    let size = usize::from_str_radix(size.trim(), 16).unwrap();
                    let mut chunk = vec![0; size + 2];
                    reader.read_exact(&mut chunk).unwrap();
                    if size == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..size]);
                }
            } else {
                body.resize(content_length, 0);
                reader.read_exact(&mut body).unwrap();
            }

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
                reply.len()
            )
            .unwrap();
            tx.send(Captured { content_type, body }).unwrap();
        });

        (url, rx)
    }

    fn client_for(url: &str, format: PayloadFormat) -> HttpUploadClient {
        let config = UploadConfig {
            endpoint: url.to_string(),
            format,
            ..UploadConfig::default()
        };
        let client = Client::builder().no_proxy().build().unwrap();
        HttpUploadClient::with_client(client, &config)
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([10, 120, 240, 128])))
    }

    #[test]
    fn encoded_jpeg_keeps_dimensions() {
        let jpeg = encode_jpeg(&test_image(), 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn raw_upload_sends_jpeg_body() {
        let (url, seen) = stub_server("200 OK", r#"{"results":[]}"#);
        let client = client_for(&url, PayloadFormat::RawJpeg);

        let response = client.upload(&test_image()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), r#"{"results":[]}"#);

        let captured = seen.recv().unwrap();
        assert_eq!(captured.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&captured.body).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn multipart_upload_uses_image_field() {
        let (url, seen) = stub_server("200 OK", r#"{"error":"No face detected."}"#);
        let client = client_for(&url, PayloadFormat::Multipart);

        let response = client.upload(&test_image()).unwrap();
        assert_eq!(response.text(), r#"{"error":"No face detected."}"#);

        let captured = seen.recv().unwrap();
        assert!(captured.content_type.starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8_lossy(&captured.body);
        assert!(body.contains(r#"name="image""#));
        assert!(body.contains(r#"filename="capture-"#));
        assert!(body.to_ascii_lowercase().contains("content-type: image/jpeg"));
    }

    #[test]
    fn non_success_status_is_rejected() {
        let (url, _seen) = stub_server("500 Internal Server Error", r#"{"error":"boom"}"#);
        let client = client_for(&url, PayloadFormat::RawJpeg);

        match client.upload(&test_image()) {
            Err(UploadError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"error":"boom"}"#);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_endpoint_is_transport_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client_for(
            &format!("http://127.0.0.1:{port}/predict"),
            PayloadFormat::Multipart,
        );

        let err = client.upload(&test_image()).unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn error_kinds_are_distinct() {
        let encode = UploadError::Encode(image::ImageError::IoError(std::io::Error::other("x")));
        let rejected = UploadError::Rejected {
            status: 400,
            body: String::new(),
        };
        assert_eq!(encode.kind(), "encode");
        assert_eq!(rejected.kind(), "rejected");
        assert!(rejected.to_string().contains("400"));
    }
}
