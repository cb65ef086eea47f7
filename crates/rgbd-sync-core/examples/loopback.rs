//! Feeds a simulated 30 Hz RGB-D camera through a loopback transport and
//! prints every delivered frame.
//!
//! ```text
//! RUST_LOG=rgbd_sync_core=debug cargo run --example loopback
//! ```

use rand::Rng;
use rgbd_sync_core::{
    BridgeDecoder, CameraInfo, DispatchRuntime, Header, ImageMessage, LoopbackTransport,
    SubscriptionOptions,
};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const FRAMES: u64 = 90;

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options = SubscriptionOptions::from_yaml(
        r#"
color_topic: /kinect/rgb/image_color
depth_topic: /kinect/depth_registered/image_raw
camera_info_topic: /kinect/rgb/camera_info
queue_size: 10
tolerance: 10ms
"#,
    )?;

    let transport = LoopbackTransport::new();
    let runtime = DispatchRuntime::new(
        &transport,
        &options,
        BridgeDecoder,
        |color, depth, intrinsics| {
            let valid = depth.as_slice().iter().filter(|&&mm| mm != 0).count();
            println!(
                "frame {}x{}: {} valid depth pixels, fx={:.1} fy={:.1}",
                color.width(),
                color.height(),
                valid,
                intrinsics.fx(),
                intrinsics.fy()
            );
        },
    )?;

    let mut rng = rand::rng();
    for i in 0..FRAMES {
        let base = 1_000 + i * 33;
        let header = |ms: u64| Header::new(Duration::from_millis(ms), "kinect_rgb_optical_frame");

        let color = ImageMessage::new(
            header(base),
            WIDTH,
            HEIGHT,
            "rgb8",
            WIDTH * 3,
            vec![128u8; (WIDTH * HEIGHT * 3) as usize],
        );

        // Float meters with a few holes, as a registered depth stream
        // would publish them.
        let depth_data: Vec<u8> = (0..WIDTH * HEIGHT)
            .map(|_| {
                if rng.random_bool(0.05) {
                    f32::NAN
                } else {
                    rng.random_range(0.5f32..4.0)
                }
            })
            .flat_map(f32::to_le_bytes)
            .collect();
        let depth = ImageMessage::new(
            header(base + rng.random_range(0..4)),
            WIDTH,
            HEIGHT,
            "32FC1",
            WIDTH * 4,
            depth_data,
        );

        let info = CameraInfo {
            header: header(base),
            width: WIDTH,
            height: HEIGHT,
            distortion_model: "plumb_bob".to_string(),
            k: vec![57.5, 0.0, 31.5, 0.0, 57.5, 23.5, 0.0, 0.0, 1.0],
            ..Default::default()
        };

        transport.publish(&options.color_topic, color);
        transport.publish(&options.depth_topic, depth);
        transport.publish(&options.camera_info_topic, info);

        std::thread::sleep(Duration::from_millis(5));
    }

    runtime.flush()?;
    let stats = runtime.shutdown()?;
    info!(
        frames = stats.frames_delivered,
        delivered = stats.delivered,
        evicted = stats.sync.evicted,
        "Done"
    );

    Ok(())
}
