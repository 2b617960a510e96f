//! Static camera description

use serde::{Deserialize, Serialize};

/// Direction the lens faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    /// Value used on the device ABI (back = 0, front = 1)
    pub fn as_raw(self) -> i32 {
        match self {
            CameraFacing::Back => 0,
            CameraFacing::Front => 1,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CameraFacing::Back),
            1 => Some(CameraFacing::Front),
            _ => None,
        }
    }
}

/// Camera description returned by the module's info query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Lens direction
    pub facing: CameraFacing,
    /// Mounting orientation of the sensor in degrees (0, 90, 180, 270)
    pub orientation: u32,
}

impl CameraInfo {
    pub fn new(facing: CameraFacing, orientation: u32) -> Self {
        Self { facing, orientation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_raw_values() {
        assert_eq!(CameraFacing::Back.as_raw(), 0);
        assert_eq!(CameraFacing::from_raw(1), Some(CameraFacing::Front));
        assert_eq!(CameraFacing::from_raw(5), None);
    }
}
