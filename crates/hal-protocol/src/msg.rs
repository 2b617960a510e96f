//! Camera message types and the enable/disable filter

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Bitmask of asynchronous camera event categories
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MsgType(i32);

impl MsgType {
    pub const NONE: MsgType = MsgType(0);
    pub const ERROR: MsgType = MsgType(0x0001);
    pub const SHUTTER: MsgType = MsgType(0x0002);
    pub const FOCUS: MsgType = MsgType(0x0004);
    pub const ZOOM: MsgType = MsgType(0x0008);
    pub const PREVIEW_FRAME: MsgType = MsgType(0x0010);
    pub const VIDEO_FRAME: MsgType = MsgType(0x0020);
    pub const POSTVIEW_FRAME: MsgType = MsgType(0x0040);
    pub const RAW_IMAGE: MsgType = MsgType(0x0080);
    pub const COMPRESSED_IMAGE: MsgType = MsgType(0x0100);
    pub const RAW_IMAGE_NOTIFY: MsgType = MsgType(0x0200);
    pub const PREVIEW_METADATA: MsgType = MsgType(0x0400);
    pub const ALL_MSGS: MsgType = MsgType(0xFFFF);

    /// Message types produced by a still capture
    pub const CAPTURE_MSGS: MsgType = MsgType(
        Self::SHUTTER.0 | Self::POSTVIEW_FRAME.0 | Self::RAW_IMAGE.0 | Self::COMPRESSED_IMAGE.0,
    );

    const NAMES: [(MsgType, &'static str); 11] = [
        (Self::ERROR, "ERROR"),
        (Self::SHUTTER, "SHUTTER"),
        (Self::FOCUS, "FOCUS"),
        (Self::ZOOM, "ZOOM"),
        (Self::PREVIEW_FRAME, "PREVIEW_FRAME"),
        (Self::VIDEO_FRAME, "VIDEO_FRAME"),
        (Self::POSTVIEW_FRAME, "POSTVIEW_FRAME"),
        (Self::RAW_IMAGE, "RAW_IMAGE"),
        (Self::COMPRESSED_IMAGE, "COMPRESSED_IMAGE"),
        (Self::RAW_IMAGE_NOTIFY, "RAW_IMAGE_NOTIFY"),
        (Self::PREVIEW_METADATA, "PREVIEW_METADATA"),
    ];

    /// Wrap raw bits as passed over the device ABI
    pub const fn from_bits(bits: i32) -> Self {
        MsgType(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set
    pub const fn contains(self, other: MsgType) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set
    pub const fn intersects(self, other: MsgType) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: MsgType) -> Self {
        MsgType(self.0 | other.0)
    }

    pub const fn difference(self, other: MsgType) -> Self {
        MsgType(self.0 & !other.0)
    }

    /// Fold raw-image-notify into raw-image.
    ///
    /// Both names address the same driver capability, so enable, disable and
    /// query requests are normalized before they touch any mask.
    pub const fn normalized(self) -> Self {
        if self.intersects(Self::RAW_IMAGE_NOTIFY) {
            self.difference(Self::RAW_IMAGE_NOTIFY).union(Self::RAW_IMAGE)
        } else {
            self
        }
    }

    /// Symbolic names of the set bits, lowest bit first
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(ty, _)| self.intersects(*ty))
            .map(|(_, name)| name)
    }
}

impl std::ops::BitOr for MsgType {
    type Output = MsgType;

    fn bitor(self, rhs: MsgType) -> MsgType {
        self.union(rhs)
    }
}

impl fmt::Debug for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgType({:#06x})", self.0)
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for name in self.names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        if first {
            write!(f, "{:#06x}", self.0)?;
        }
        Ok(())
    }
}

/// Enabled message types of one session.
///
/// Written by the consumer thread, read by the driver's callback threads. All
/// updates are single atomic read-modify-write operations, so a reader never
/// observes a torn mask.
#[derive(Debug, Default)]
pub struct MessageFilter {
    mask: AtomicI32,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the given types, returning the normalized set actually applied
    pub fn enable(&self, msg: MsgType) -> MsgType {
        let msg = msg.normalized();
        self.mask.fetch_or(msg.bits(), Ordering::AcqRel);
        msg
    }

    /// Disable the given types, returning the normalized set actually applied
    pub fn disable(&self, msg: MsgType) -> MsgType {
        let msg = msg.normalized();
        self.mask.fetch_and(!msg.bits(), Ordering::AcqRel);
        msg
    }

    /// True if any of the requested types is enabled
    pub fn is_enabled(&self, msg: MsgType) -> bool {
        self.snapshot().intersects(msg.normalized())
    }

    /// Current mask
    pub fn snapshot(&self) -> MsgType {
        MsgType::from_bits(self.mask.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_raw_notify_folds_into_raw_image() {
        let filter = MessageFilter::new();
        let applied = filter.enable(MsgType::RAW_IMAGE_NOTIFY | MsgType::SHUTTER);
        assert_eq!(applied, MsgType::RAW_IMAGE | MsgType::SHUTTER);
        assert!(filter.is_enabled(MsgType::RAW_IMAGE));
        assert!(filter.is_enabled(MsgType::RAW_IMAGE_NOTIFY));

        filter.disable(MsgType::RAW_IMAGE_NOTIFY);
        assert!(!filter.is_enabled(MsgType::RAW_IMAGE));
        assert!(filter.is_enabled(MsgType::SHUTTER));
    }

    #[test]
    fn test_enable_disable() {
        let filter = MessageFilter::new();
        assert!(!filter.is_enabled(MsgType::PREVIEW_FRAME));

        filter.enable(MsgType::PREVIEW_FRAME | MsgType::FOCUS);
        assert!(filter.is_enabled(MsgType::PREVIEW_FRAME));

        filter.disable(MsgType::PREVIEW_FRAME);
        assert!(!filter.is_enabled(MsgType::PREVIEW_FRAME));
        assert!(filter.is_enabled(MsgType::FOCUS));
    }

    #[test]
    fn test_display_names() {
        let msg = MsgType::SHUTTER | MsgType::COMPRESSED_IMAGE;
        assert_eq!(msg.to_string(), "SHUTTER|COMPRESSED_IMAGE");
        assert_eq!(MsgType::NONE.to_string(), "NONE");
        assert_eq!(MsgType::from_bits(0x1000).to_string(), "0x1000");
    }

    proptest! {
        #[test]
        fn prop_normalized_never_carries_raw_notify(bits in 0i32..0x0800) {
            let msg = MsgType::from_bits(bits).normalized();
            prop_assert!(!msg.intersects(MsgType::RAW_IMAGE_NOTIFY));
            prop_assert_eq!(msg.normalized(), msg);
        }

        #[test]
        fn prop_filter_tracks_last_write(ops in proptest::collection::vec((any::<bool>(), 0i32..0x0800), 0..32)) {
            let filter = MessageFilter::new();
            let mut expected = MsgType::NONE;
            for (enable, bits) in ops {
                let msg = MsgType::from_bits(bits);
                if enable {
                    expected = expected.union(filter.enable(msg));
                } else {
                    expected = expected.difference(filter.disable(msg));
                }
            }
            prop_assert_eq!(filter.snapshot(), expected);
        }
    }
}
