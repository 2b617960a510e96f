//! Parameter fixups applied on every `get_parameters`
//!
//! The vendor driver under-reports or mis-reports a handful of keys that the
//! camera service relies on. Fixups are idempotent: running them on their own
//! output changes nothing.

use hal_protocol::{keys, CameraParameters, HalError};

use crate::config::SessionConfig;

pub const PREFERRED_PREVIEW_SIZE: &str = "640x480";
pub const DEFAULT_PREVIEW_FRAME_RATES: &str = "30,27,24,15";
pub const DEFAULT_PREVIEW_FRAME_RATE: &str = "30";
pub const DEFAULT_PREVIEW_FPS_RANGE: &str = "15000,30000";
pub const DEFAULT_PREVIEW_FPS_RANGES: &str = "(15000,30000)";

/// Upper bounds for the image-quality maxima the driver advertises
const CAPS: [(&str, i64); 3] = [
    (keys::MAX_SHARPNESS, 30),
    (keys::MAX_CONTRAST, 10),
    (keys::MAX_SATURATION, 10),
];

/// Rewrite `params` in place into the form handed to the consumer
pub fn apply_fixups(params: &mut CameraParameters, session: &SessionConfig) -> Result<(), HalError> {
    params.set(keys::VIDEO_FRAME_FORMAT, keys::PIXEL_FORMAT_YUV420SP)?;
    params.set(keys::PREFERRED_PREVIEW_SIZE_FOR_VIDEO, PREFERRED_PREVIEW_SIZE)?;
    params.set(keys::NUM_SNAPS_PER_SHUTTER, "1")?;

    for (key, cap) in CAPS {
        let value = params.get_int(key).map_or(cap, |v| v.min(cap));
        params.set(key, value.to_string())?;
    }

    params.set_if_absent(keys::SUPPORTED_PREVIEW_FRAME_RATES, DEFAULT_PREVIEW_FRAME_RATES)?;
    params.set_if_absent(keys::PREVIEW_FRAME_RATE, DEFAULT_PREVIEW_FRAME_RATE)?;
    params.set_if_absent(keys::PREVIEW_SIZE, PREFERRED_PREVIEW_SIZE)?;
    params.set_if_absent(keys::PREVIEW_FPS_RANGE, DEFAULT_PREVIEW_FPS_RANGE)?;
    params.set_if_absent(keys::SUPPORTED_PREVIEW_FPS_RANGE, DEFAULT_PREVIEW_FPS_RANGES)?;

    params.set(keys::ORIENTATION, session.orientation.as_str())?;
    if let Some(rotation) = &session.rotation {
        params.set(keys::ROTATION, rotation.as_str())?;
    }
    if let Some(mode) = &session.front_camera_mode {
        params.set(keys::FRONT_CAMERA_MODE, mode.as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HalConfig;
    use proptest::prelude::*;

    fn fixed(blob: &str, session: &SessionConfig) -> CameraParameters {
        let mut params = CameraParameters::unflatten(blob).unwrap();
        apply_fixups(&mut params, session).unwrap();
        params
    }

    #[test]
    fn test_empty_blob_gets_defaults() {
        let params = fixed("", &SessionConfig::default());
        assert_eq!(params.get(keys::VIDEO_FRAME_FORMAT), Some("yuv420sp"));
        assert_eq!(params.get(keys::PREVIEW_SIZE), Some("640x480"));
        assert_eq!(params.get(keys::PREVIEW_FRAME_RATE), Some("30"));
        assert_eq!(params.get(keys::SUPPORTED_PREVIEW_FRAME_RATES), Some("30,27,24,15"));
        assert_eq!(params.get(keys::MAX_SHARPNESS), Some("30"));
        assert_eq!(params.get(keys::ORIENTATION), Some("landscape"));
        assert_eq!(params.get(keys::ROTATION), None);
    }

    #[test]
    fn test_driver_values_kept_when_present() {
        let params = fixed(
            "preview-size=320x240;preview-frame-rate=15;max-contrast=4;max-sharpness=100;zoom=2",
            &SessionConfig::default(),
        );
        assert_eq!(params.preview_size(), Some((320, 240)));
        assert_eq!(params.get(keys::PREVIEW_FRAME_RATE), Some("15"));
        assert_eq!(params.get(keys::MAX_CONTRAST), Some("4"));
        assert_eq!(params.get(keys::MAX_SHARPNESS), Some("30"));
        assert_eq!(params.get("zoom"), Some("2"));
    }

    #[test]
    fn test_session_overrides() {
        let config = HalConfig {
            params_rotation: Some("90".to_string()),
            front_camera_mode: Some("reverse".to_string()),
            ..Default::default()
        };
        let front = fixed("orientation=portrait", &config.session(1));
        assert_eq!(front.get(keys::ORIENTATION), Some("landscape"));
        assert_eq!(front.get(keys::ROTATION), Some("90"));
        assert_eq!(front.get(keys::FRONT_CAMERA_MODE), Some("reverse"));

        let back = fixed("", &config.session(0));
        assert_eq!(back.get(keys::FRONT_CAMERA_MODE), Some("mirror"));
    }

    fn blob_strategy() -> impl Strategy<Value = String> {
        let key = prop_oneof![
            Just(keys::PREVIEW_SIZE.to_string()),
            Just(keys::MAX_SHARPNESS.to_string()),
            Just(keys::MAX_CONTRAST.to_string()),
            Just(keys::PREVIEW_FRAME_RATE.to_string()),
            Just(keys::ORIENTATION.to_string()),
            "[a-z][a-z-]{0,12}",
        ];
        let value = "[a-z0-9,x()-]{0,10}";
        proptest::collection::vec((key, value), 0..8).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(";")
        })
    }

    proptest! {
        #[test]
        fn prop_fixups_idempotent(blob in blob_strategy(), camera_id in 0i32..2, rotate in any::<bool>()) {
            let config = HalConfig {
                params_rotation: rotate.then(|| "180".to_string()),
                front_camera_mode: Some("reverse".to_string()),
                ..Default::default()
            };
            let session = config.session(camera_id);
            let once = fixed(&blob, &session);
            let mut twice = once.clone();
            apply_fixups(&mut twice, &session).unwrap();
            prop_assert_eq!(once.flatten(), twice.flatten());
        }
    }
}
