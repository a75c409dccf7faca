//! # Image Acquisition
//!
//! The pipeline only needs "give me a decoded image or tell me why not". The
//! production provider shells out to `libcamera-jpeg`, which writes a JPEG file
//! that we decode with the `image` crate.
//!
//! ## File Ownership
//! Every capture gets its own temporary file. The [`tempfile::NamedTempFile`]
//! guard removes it when `capture` returns, on success and on every error
//! path, so no capture outlives its cycle.

use crate::config::CameraConfig;
use image::DynamicImage;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use thiserror::Error;

/// Errors that can occur while acquiring an image
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Temporary output file could not be created
    #[error("failed to create capture file: {0}")]
    TempFile(#[source] io::Error),

    /// Capture utility could not be started (missing binary, permissions)
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Capture utility ran but reported failure
    #[error("{command} exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Output file was missing, truncated or not an image
    #[error("failed to decode captured image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Source of still images for the capture-and-upload sequence.
pub trait ImageProvider {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError>;
}

impl<P: ImageProvider + ?Sized> ImageProvider for Box<P> {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        (**self).capture()
    }
}

/// Runs `<command> <args..> -o <file>` and decodes the resulting JPEG.
#[derive(Debug, Clone)]
pub struct CommandImageProvider {
    command: String,
    args: Vec<String>,
    temp_dir: Option<PathBuf>,
}

impl CommandImageProvider {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            temp_dir: None,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    /// Place capture files in `dir` instead of the system temp directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

impl ImageProvider for CommandImageProvider {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("capture-").suffix(".jpg");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(CaptureError::TempFile)?;

        log::debug!("Running {} -> {}", self.command, file.path().display());
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("-o")
            .arg(file.path())
            .output()
            .map_err(|source| CaptureError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CaptureError::Exit {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image = image::open(file.path())?;
        log::debug!("Captured {}x{} image", image.width(), image.height());
        Ok(image)
    }
}
