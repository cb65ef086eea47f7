use crate::types::StreamKind;
use eyre::{Result, WrapErr, bail, ensure};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Configuration parameters for the [Synchronizer](crate::Synchronizer)
/// and [sync](crate::sync()).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// The maximum pairwise timestamp difference for messages to be
    /// grouped into one triplet.
    pub tolerance: Duration,
    /// The maximum number of unmatched messages kept for each stream.
    pub queue_size: usize,
}

impl SyncConfig {
    pub fn new(tolerance: Duration, queue_size: usize) -> Self {
        Self {
            tolerance,
            queue_size,
        }
    }

    /// Sanity check.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.queue_size >= 1, "queue_size must be at least 1");
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            queue_size: default_queue_size(),
        }
    }
}

/// Channel names and delivery settings for the three input streams.
///
/// This is the configuration surface of a
/// [DispatchRuntime](crate::DispatchRuntime). Topic names, queue depth
/// and hints are handed to the transport as-is.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubscriptionOptions {
    /// Topic carrying color images.
    pub color_topic: String,

    /// Topic carrying depth images.
    pub depth_topic: String,

    /// Topic carrying camera calibration records.
    pub camera_info_topic: String,

    /// Transport queue depth, delivery queue bound and synchronizer buffer
    /// bound per stream.
    pub queue_size: usize,

    /// Maximum pairwise timestamp difference within a triplet.
    #[serde(with = "humantime_serde")]
    pub tolerance: Duration,

    /// Transport hints passed through to every subscription.
    pub hints: TransportHints,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            color_topic: "camera/rgb/image_raw".to_string(),
            depth_topic: "camera/depth_registered/image_raw".to_string(),
            camera_info_topic: "camera/rgb/camera_info".to_string(),
            queue_size: default_queue_size(),
            tolerance: default_tolerance(),
            hints: TransportHints::default(),
        }
    }
}

impl SubscriptionOptions {
    /// Load options from a YAML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse options from a YAML document and validate them.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let options: SubscriptionOptions =
            serde_yaml::from_str(contents).wrap_err("Failed to parse subscription options")?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.queue_size > 0, "queue_size must be greater than zero");

        for kind in StreamKind::ALL {
            ensure!(
                !self.topic(kind).is_empty(),
                "Topic for the {} stream cannot be empty",
                kind
            );
        }

        let mut topics: Vec<&str> = StreamKind::ALL.iter().map(|&k| self.topic(k)).collect();
        topics.sort();
        for window in topics.windows(2) {
            if window[0] == window[1] {
                bail!("Duplicate topic: {}", window[0]);
            }
        }

        Ok(())
    }

    /// The topic subscribed for a stream.
    pub fn topic(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Color => &self.color_topic,
            StreamKind::Depth => &self.depth_topic,
            StreamKind::Calibration => &self.camera_info_topic,
        }
    }

    /// Convert to the synchronizer configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            tolerance: self.tolerance,
            queue_size: self.queue_size,
        }
    }
}

/// Delivery hints a transport may honor. The pipeline does not
/// interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportHints {
    /// Image transport name, e.g. "raw" or "compressed".
    pub transport: String,

    /// Reliability setting.
    pub reliability: Reliability,
}

impl Default for TransportHints {
    fn default() -> Self {
        Self {
            transport: "raw".to_string(),
            reliability: Reliability::BestEffort,
        }
    }
}

/// Reliability policy options.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    #[default]
    BestEffort,
    Reliable,
}

fn default_queue_size() -> usize {
    10
}

fn default_tolerance() -> Duration {
    Duration::from_millis(20)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let options = SubscriptionOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.queue_size, 10);
        assert_eq!(options.tolerance, Duration::from_millis(20));
        assert_eq!(options.hints.transport, "raw");
        assert_eq!(options.hints.reliability, Reliability::BestEffort);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
color_topic: /kinect/rgb/image_rect_color
depth_topic: /kinect/depth/image_raw
camera_info_topic: /kinect/rgb/camera_info
queue_size: 5
tolerance: 33ms
hints:
  transport: compressed
  reliability: reliable
"#;
        let options = SubscriptionOptions::from_yaml(yaml).unwrap();

        assert_eq!(options.color_topic, "/kinect/rgb/image_rect_color");
        assert_eq!(options.depth_topic, "/kinect/depth/image_raw");
        assert_eq!(options.camera_info_topic, "/kinect/rgb/camera_info");
        assert_eq!(options.queue_size, 5);
        assert_eq!(options.tolerance, Duration::from_millis(33));
        assert_eq!(options.hints.transport, "compressed");
        assert_eq!(options.hints.reliability, Reliability::Reliable);

        let sync_config = options.sync_config();
        assert_eq!(sync_config.queue_size, 5);
        assert_eq!(sync_config.tolerance, Duration::from_millis(33));
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let options = SubscriptionOptions::from_yaml("queue_size: 3\n").unwrap();
        assert_eq!(options.queue_size, 3);
        assert_eq!(options.color_topic, "camera/rgb/image_raw");
        assert_eq!(options.tolerance, Duration::from_millis(20));
    }

    #[test]
    fn test_zero_queue_size_rejected() {
        let result = SubscriptionOptions::from_yaml("queue_size: 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_topics_rejected() {
        let yaml = "color_topic: /a\ndepth_topic: /a\n";
        let err = SubscriptionOptions::from_yaml(yaml).unwrap_err();
        assert!(format!("{err:?}").contains("Duplicate topic"));
    }

    #[test]
    fn test_empty_topic_rejected() {
        let result = SubscriptionOptions::from_yaml("camera_info_topic: \"\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tolerance: 5ms").unwrap();

        let options = SubscriptionOptions::load(file.path()).unwrap();
        assert_eq!(options.tolerance, Duration::from_millis(5));
    }

    #[test]
    fn test_load_missing_file() {
        let result = SubscriptionOptions::load("/nonexistent/rgbd-sync.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_config_validation() {
        assert!(SyncConfig::new(Duration::from_millis(5), 1).validate().is_ok());
        assert!(SyncConfig::new(Duration::ZERO, 4).validate().is_ok());
        assert!(SyncConfig::new(Duration::from_millis(5), 0).validate().is_err());
    }
}
