use crate::core_modules::geometry::NativeResolution;
use crate::error::ZoneError;
use base64::Engine as _;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
    Webp,
}

impl FrameFormat {
    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

/// One encoded video frame as pushed by the analysis service.
///
/// Only the header is inspected (for the natural resolution); the pixel data is
/// kept encoded and handed to the display as-is.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,
}

impl FramePacket {
    /// Decodes the base64 payload of a `frame` stream event.
    pub fn from_base64(payload: &str) -> Result<Self, ZoneError> {
        // Tolerate a data-URI prefix in case the service sends one.
        let encoded = payload
            .split_once(";base64,")
            .map_or(payload, |(_, rest)| rest)
            .trim();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ZoneError::MalformedFrame(format!("invalid base64: {e}")))?;
        Self::from_encoded(bytes)
    }

    /// Wraps already-decoded image bytes, reading dimensions from the header.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, ZoneError> {
        let format = image::guess_format(&bytes)
            .ok()
            .and_then(FrameFormat::from_image_format)
            .ok_or_else(|| ZoneError::MalformedFrame("unrecognised image format".into()))?;

        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| ZoneError::MalformedFrame(e.to_string()))?
            .into_dimensions()
            .map_err(|e| ZoneError::MalformedFrame(e.to_string()))?;

        Ok(Self {
            ts_millis: now_millis(),
            width,
            height,
            format,
            data: Arc::from(bytes),
        })
    }

    pub fn resolution(&self) -> NativeResolution {
        NativeResolution::new(self.width, self.height)
    }

    /// Renders the frame as a `data:` URI suitable for an image element.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
