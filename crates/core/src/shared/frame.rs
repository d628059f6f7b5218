use ndarray::ArrayView3;

/// One decoded camera frame: tightly packed RGB bytes, row-major.
///
/// Capture devices convert to RGB at the boundary; everything downstream
/// (detector, renderer, display) works from this type.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sequence number assigned by the capture stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, Self::CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Expands to opaque RGBA, the layout GUI image handles expect.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.data.len() / Self::CHANNELS * 4);
        for px in self.data.chunks_exact(Self::CHANNELS) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        rgba
    }
}
