//! Camera HAL smoke run against the in-process mock driver
//!
//! Usage: camera-hal-smoke [CONFIG_FILE] [overlay|window]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use camera_driver::mock::{MockPlatform, MockWindow};
use camera_driver::DriverGeneration;
use camera_hal::{init_logging, CameraModule, HalConfig};
use frame_relay::{ConsumerCallbacks, ConsumerCookie, VecAllocator};
use hal_protocol::MsgType;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let generation = match args.next().as_deref() {
        Some("overlay") => DriverGeneration::Overlay,
        _ => DriverGeneration::Window,
    };

    let config = HalConfig::load(config_path.as_deref())?;
    init_logging(&config.log_level);
    info!("=== Camera HAL smoke v{} ({generation}) ===", env!("CARGO_PKG_VERSION"));

    let platform = Arc::new(MockPlatform::two_cameras(generation));
    let module = CameraModule::new(platform.clone(), config);
    for id in 0..module.number_of_cameras() {
        info!(id, info = ?module.camera_info(id)?, "camera");
    }

    let device = module.open(0)?;
    let camera = platform.camera(0).ok_or("mock camera missing")?;

    let allocator = VecAllocator::new();
    let frames = Arc::new(AtomicUsize::new(0));
    let recorded = Arc::new(AtomicUsize::new(0));
    let (frames_seen, recorded_seen) = (frames.clone(), recorded.clone());
    device.set_callbacks(
        ConsumerCallbacks::new(ConsumerCookie(0))
            .with_request_memory(allocator.request_memory())
            .with_data(move |_, block, _, _| {
                frames_seen.fetch_add(1, Ordering::SeqCst);
                if let Some(block) = block {
                    block.release();
                }
            })
            .with_data_timestamp(move |_, _, _, _, _| {
                recorded_seen.fetch_add(1, Ordering::SeqCst);
            }),
    );
    device.enable_msg_type(MsgType::PREVIEW_FRAME | MsgType::VIDEO_FRAME);

    let window = MockWindow::new(2);
    if device.set_preview_window(Some(window.clone())) != 0 {
        return Err("preview window negotiation failed".into());
    }
    if device.start_preview() != 0 {
        return Err("start_preview failed".into());
    }

    let (width, height) = device.preview_size().unwrap_or((640, 480));
    let frame = vec![0x80u8; width as usize * height as usize * 3 / 2];
    for _ in 0..5 {
        camera.emit_preview_buffer(&frame);
        camera.emit_data(MsgType::PREVIEW_FRAME, &frame[..64]);
    }

    device.start_recording();
    for ts in 0..8 {
        while !camera.emit_recording_frame(ts * 33_333_333, &frame[..64]) {
            std::thread::yield_now();
        }
    }
    device.stop_recording();

    device.close();
    info!(
        preview_callbacks = frames.load(Ordering::SeqCst),
        recorded = recorded.load(Ordering::SeqCst),
        returned = camera.frames_returned(),
        overlay_frames = window.queued_frames().len(),
        live_sessions = module.sessions().live_count(),
        "Smoke run complete"
    );
    Ok(())
}
