/// Properties of an opened capture stream, known once its metadata is ready.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub device: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction() {
        let meta = VideoMetadata {
            width: 1280,
            height: 720,
            fps: 30.0,
            codec: "rawvideo".to_string(),
            device: "/dev/video0".to_string(),
        };
        assert_eq!(meta.width, 1280);
        assert_eq!(meta.height, 720);
        assert_eq!(meta.fps, 30.0);
        assert_eq!(meta.codec, "rawvideo");
        assert_eq!(meta.device, "/dev/video0");
    }

    #[test]
    fn test_still_image_metadata() {
        // Still images are a stream with fps=0
        let meta = VideoMetadata {
            width: 800,
            height: 600,
            fps: 0.0,
            codec: "png".to_string(),
            device: "street.png".to_string(),
        };
        assert_eq!(meta.fps, 0.0);
        assert_eq!(meta.clone(), meta);
    }
}
