//! Flattened camera parameter blob
//!
//! Parameters travel as a single `key=value;key=value` string. Unknown keys are
//! carried through untouched; flattening orders keys lexicographically so a
//! given set of parameters always produces the same bytes.

use std::collections::BTreeMap;
use std::fmt;

use crate::HalError;

/// Well-known parameter keys
pub mod keys {
    pub const PREVIEW_SIZE: &str = "preview-size";
    pub const PREVIEW_FORMAT: &str = "preview-format";
    pub const PREVIEW_FRAME_RATE: &str = "preview-frame-rate";
    pub const SUPPORTED_PREVIEW_FRAME_RATES: &str = "preview-frame-rate-values";
    pub const PREVIEW_FPS_RANGE: &str = "preview-fps-range";
    pub const SUPPORTED_PREVIEW_FPS_RANGE: &str = "preview-fps-range-values";
    pub const VIDEO_FRAME_FORMAT: &str = "video-frame-format";
    pub const PREFERRED_PREVIEW_SIZE_FOR_VIDEO: &str = "preferred-preview-size-for-video";
    pub const MAX_SHARPNESS: &str = "max-sharpness";
    pub const MAX_CONTRAST: &str = "max-contrast";
    pub const MAX_SATURATION: &str = "max-saturation";
    pub const NUM_SNAPS_PER_SHUTTER: &str = "num-snaps-per-shutter";
    pub const ORIENTATION: &str = "orientation";
    pub const ROTATION: &str = "rotation";
    pub const FRONT_CAMERA_MODE: &str = "front-camera-mode";

    /// Pixel format value for YUV 4:2:0 semi-planar
    pub const PIXEL_FORMAT_YUV420SP: &str = "yuv420sp";
}

/// Parsed parameter blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraParameters {
    entries: BTreeMap<String, String>,
}

impl CameraParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flattened blob.
    ///
    /// Empty segments (a trailing `;`, or an empty blob) are ignored. A segment
    /// without `=` or with an empty key is rejected.
    pub fn unflatten(blob: &str) -> Result<Self, HalError> {
        let mut entries = BTreeMap::new();
        for segment in blob.split(';') {
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                HalError::invalid(format!("parameter segment without '=': {segment:?}"))
            })?;
            if key.is_empty() {
                return Err(HalError::invalid(format!("empty parameter key in {segment:?}")));
            }
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(Self { entries })
    }

    /// Serialize back to the wire form
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set a value. Keys and values may not contain the blob separators.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), HalError> {
        let value = value.into();
        if key.is_empty() || key.contains(['=', ';']) {
            return Err(HalError::invalid(format!("bad parameter key {key:?}")));
        }
        if value.contains(['=', ';']) {
            return Err(HalError::invalid(format!("bad value {value:?} for {key}")));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Set only when the key is absent. Returns true if a value was written.
    pub fn set_if_absent(&mut self, key: &str, value: &str) -> Result<bool, HalError> {
        if self.entries.contains_key(key) {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Integer value of a key, if present and numeric
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Preview size as `(width, height)` parsed from `WIDTHxHEIGHT`
    pub fn preview_size(&self) -> Option<(u32, u32)> {
        let (w, h) = self.get(keys::PREVIEW_SIZE)?.split_once('x')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }

    pub fn preview_format(&self) -> Option<&str> {
        self.get(keys::PREVIEW_FORMAT)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for CameraParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

impl std::str::FromStr for CameraParameters {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::unflatten(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unflatten_and_lookup() {
        let params =
            CameraParameters::unflatten("preview-size=640x480;preview-format=yuv420sp;zoom=0;")
                .unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params.preview_size(), Some((640, 480)));
        assert_eq!(params.preview_format(), Some("yuv420sp"));
        assert_eq!(params.get_int("zoom"), Some(0));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_flatten_is_sorted() {
        let params = CameraParameters::unflatten("b=2;a=1;c=3").unwrap();
        assert_eq!(params.flatten(), "a=1;b=2;c=3");
    }

    #[test]
    fn test_malformed_blob_rejected() {
        assert!(matches!(
            CameraParameters::unflatten("preview-size=640x480;garbage"),
            Err(HalError::InvalidArgument(_))
        ));
        assert!(matches!(
            CameraParameters::unflatten("=value"),
            Err(HalError::InvalidArgument(_))
        ));
        assert!(CameraParameters::unflatten("").unwrap().is_empty());
    }

    #[test]
    fn test_value_may_contain_commas_and_parens() {
        let params =
            CameraParameters::unflatten("preview-fps-range-values=(15000,30000),(30000,30000)")
                .unwrap();
        assert_eq!(
            params.get("preview-fps-range-values"),
            Some("(15000,30000),(30000,30000)")
        );
    }

    #[test]
    fn test_set_rejects_separators() {
        let mut params = CameraParameters::new();
        assert!(params.set("a;b", "1").is_err());
        assert!(params.set("a", "1=2").is_err());
        assert!(params.set_if_absent("a", "1").unwrap());
        assert!(!params.set_if_absent("a", "2").unwrap());
        assert_eq!(params.get("a"), Some("1"));
    }

    #[test]
    fn test_bad_preview_size() {
        let params = CameraParameters::unflatten("preview-size=wide").unwrap();
        assert_eq!(params.preview_size(), None);
    }
}
