use crate::error::{Error, Result};

/// Check a channel value coming in as a wider integer (CLI, JSON) without
/// clamping it.
pub fn channel_value(value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::out_of_range("channel value", value, 255))
}

/// Colors for every LED of a strip, in physical order.
///
/// Channels are stored in canonical order (R, G, B, W); the wire order is
/// applied at encode time. The LED count is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFrame {
    channels: usize,
    data: Vec<u8>,
}

impl ColorFrame {
    /// A frame with every LED off
    pub fn new(led_count: usize, channels_per_pixel: usize) -> Self {
        assert!(channels_per_pixel > 0, "a pixel needs at least one channel");
        ColorFrame {
            channels: channels_per_pixel,
            data: vec![0; led_count * channels_per_pixel],
        }
    }

    pub fn led_count(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn channels_per_pixel(&self) -> usize {
        self.channels
    }

    pub fn pixel(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.channels)?;
        self.data.get(start..start.checked_add(self.channels)?)
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.channels)
    }

    pub fn set_pixel(&mut self, index: usize, channels: &[u8]) -> Result<()> {
        if index >= self.led_count() {
            return Err(Error::out_of_range("pixel index", index, self.led_count()));
        }
        self.check_width(channels)?;

        let start = index * self.channels;
        self.data[start..start + self.channels].copy_from_slice(channels);
        Ok(())
    }

    /// Overwrite consecutive pixels starting at `start`, leaving the rest of
    /// the frame alone. `pixels` holds whole pixels back to back.
    pub fn write_range(&mut self, start: usize, pixels: &[u8]) -> Result<()> {
        if pixels.len() % self.channels != 0 {
            return Err(Error::out_of_range(
                "range length",
                pixels.len(),
                pixels.len() / self.channels * self.channels,
            ));
        }

        let count = pixels.len() / self.channels;
        let end = start.saturating_add(count);
        if end > self.led_count() {
            return Err(Error::out_of_range("range end", end, self.led_count()));
        }

        let offset = start * self.channels;
        self.data[offset..offset + pixels.len()].copy_from_slice(pixels);
        Ok(())
    }

    /// Set every LED to the same color
    pub fn fill(&mut self, channels: &[u8]) -> Result<()> {
        self.check_width(channels)?;
        for pixel in self.data.chunks_exact_mut(self.channels) {
            pixel.copy_from_slice(channels);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn check_width(&self, channels: &[u8]) -> Result<()> {
        if channels.len() != self.channels {
            return Err(Error::out_of_range("channel count", channels.len(), self.channels));
        }
        Ok(())
    }
}
