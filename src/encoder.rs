use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frame::ColorFrame;
use crate::pixel_format::ChannelOrder;
use crate::table::LookupTable;
use crate::timing::TimingModel;

/// Bytes ready to be clocked out: encoded pixels followed by reset padding.
///
/// Only one side holds a buffer at a time. The encoder fills it, then it is
/// moved (or lent read only) to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    bytes: Box<[u8]>,
}

impl OutputBuffer {
    pub fn zeroed(len: usize) -> Self {
        OutputBuffer {
            bytes: vec![0; len].into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for OutputBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Turns color frames into wire bytes for one strip.
///
/// The table is shared, the output buffer is owned and reused on every
/// [`encode`](FrameEncoder::encode). Each pixel lands at a fixed offset, so
/// the output length and layout never depend on the colors.
#[derive(Debug)]
pub struct FrameEncoder {
    table: Arc<LookupTable>,
    order: ChannelOrder,
    led_count: usize,
    reset_padding_len: usize,
    buffer: OutputBuffer,
}

impl FrameEncoder {
    pub fn new(
        table: Arc<LookupTable>,
        order: ChannelOrder,
        led_count: usize,
        reset_padding_len: usize,
    ) -> Self {
        let mut encoder = FrameEncoder {
            table,
            order,
            led_count,
            reset_padding_len,
            buffer: OutputBuffer::default(),
        };
        encoder.buffer = encoder.new_buffer();
        encoder
    }

    /// Build the table for `model` and an encoder using it
    pub fn from_model(model: &TimingModel, order: ChannelOrder, led_count: usize) -> Result<Self> {
        let table = LookupTable::from_model(model)?;
        Ok(Self::new(Arc::new(table), order, led_count, model.reset_padding_len()))
    }

    pub fn table(&self) -> &Arc<LookupTable> {
        &self.table
    }

    pub fn order(&self) -> &ChannelOrder {
        &self.order
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    pub fn channels_per_pixel(&self) -> usize {
        self.order.len()
    }

    pub fn bytes_per_channel(&self) -> usize {
        self.table.bytes_per_entry()
    }

    pub fn reset_padding_len(&self) -> usize {
        self.reset_padding_len
    }

    fn pixel_len(&self) -> usize {
        self.channels_per_pixel() * self.bytes_per_channel()
    }

    /// Total bytes of one transmission
    pub fn buffer_len(&self) -> usize {
        self.led_count * self.pixel_len() + self.reset_padding_len
    }

    /// Where the encoding of `channel` (wire position) of `pixel` starts
    pub fn offset(&self, pixel: usize, channel: usize) -> usize {
        pixel * self.pixel_len() + channel * self.bytes_per_channel()
    }

    /// A buffer of the right size for [`encode_into`](FrameEncoder::encode_into)
    pub fn new_buffer(&self) -> OutputBuffer {
        OutputBuffer::zeroed(self.buffer_len())
    }

    /// A frame of the right shape for this encoder, all LEDs off
    pub fn new_frame(&self) -> ColorFrame {
        ColorFrame::new(self.led_count, self.channels_per_pixel())
    }

    /// Encode into the internal buffer and return a view of it.
    ///
    /// The view is overwritten by the next call; copy it to keep it.
    pub fn encode(&mut self, frame: &ColorFrame) -> Result<&[u8]> {
        let mut buffer = std::mem::take(&mut self.buffer);
        let result = self.encode_into(frame, &mut buffer);
        self.buffer = buffer;
        result?;
        Ok(self.buffer.as_bytes())
    }

    /// Encode into a buffer the caller owns, used to alternate buffers while
    /// one of them is being transmitted.
    pub fn encode_into(&self, frame: &ColorFrame, out: &mut OutputBuffer) -> Result<()> {
        if frame.led_count() != self.led_count || frame.channels_per_pixel() != self.channels_per_pixel() {
            return Err(Error::invalid_config(format!(
                "frame of {} x {} channels given to encoder for {} x {}",
                frame.led_count(),
                frame.channels_per_pixel(),
                self.led_count,
                self.channels_per_pixel()
            )));
        }
        if out.len() != self.buffer_len() {
            *out = self.new_buffer();
        }

        let stride = self.bytes_per_channel();
        let (pixels, padding) = out.bytes.split_at_mut(self.led_count * self.pixel_len());

        // Every pixel owns a disjoint chunk, nothing here depends on ordering
        // between pixels.
        for (pixel, chunk) in frame.pixels().zip(pixels.chunks_exact_mut(self.pixel_len())) {
            for (value, slot) in self.order.apply(pixel).zip(chunk.chunks_exact_mut(stride)) {
                slot.copy_from_slice(self.table.entry(value));
            }
        }
        padding.fill(0);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;

    fn encoder(led_count: usize, order: &str) -> FrameEncoder {
        let model = TimingModel::build(&TimingConfig::ws2812b(2_400_000)).unwrap();
        FrameEncoder::from_model(&model, order.parse().unwrap(), led_count).unwrap()
    }

    #[test]
    fn test_buffer_length() {
        for led_count in [0, 1, 7, 60] {
            let mut encoder = encoder(led_count, "GRB");
            let frame = encoder.new_frame();
            let len = encoder.encode(&frame).unwrap().len();
            assert_eq!(len, led_count * 3 * 3 + 16);
        }
    }

    #[test]
    fn test_empty_strip_is_only_padding() {
        let mut encoder = encoder(0, "GRB");
        let frame = encoder.new_frame();
        assert_eq!(encoder.encode(&frame).unwrap(), &[0; 16]);
    }

    #[test]
    fn test_red_pixel_in_grb() {
        let mut encoder = encoder(1, "GRB");
        let table = Arc::clone(encoder.table());
        let mut frame = encoder.new_frame();
        frame.set_pixel(0, &[255, 0, 0]).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(table.entry(0));
        expected.extend_from_slice(table.entry(255));
        expected.extend_from_slice(table.entry(0));
        expected.extend_from_slice(&[0; 16]);

        assert_eq!(encoder.encode(&frame).unwrap(), &expected[..]);
    }

    #[test]
    fn test_deterministic() {
        let mut encoder = encoder(5, "GRB");
        let mut frame = encoder.new_frame();
        for i in 0..5u8 {
            frame.set_pixel(usize::from(i), &[i, i * 40, 255 - i]).unwrap();
        }

        let first = encoder.encode(&frame).unwrap().to_vec();
        let second = encoder.encode(&frame).unwrap().to_vec();
        assert_eq!(first, second);

        let mut other = encoder.new_buffer();
        encoder.encode_into(&frame, &mut other).unwrap();
        assert_eq!(other.as_bytes(), &first[..]);
    }

    #[test]
    fn test_change_is_local() {
        let mut encoder = encoder(4, "GRB");
        let mut frame = encoder.new_frame();
        frame.fill(&[10, 20, 30]).unwrap();
        let before = encoder.encode(&frame).unwrap().to_vec();

        frame.set_pixel(2, &[200, 100, 50]).unwrap();
        let after = encoder.encode(&frame).unwrap().to_vec();

        let start = encoder.offset(2, 0);
        let end = encoder.offset(3, 0);
        assert_eq!(before[..start], after[..start]);
        assert_eq!(before[end..], after[end..]);
        assert_ne!(before[start..end], after[start..end]);
    }

    #[test]
    fn test_offsets() {
        let encoder = encoder(4, "GRBW");
        assert_eq!(encoder.offset(0, 0), 0);
        assert_eq!(encoder.offset(0, 1), 3);
        assert_eq!(encoder.offset(1, 0), 12);
        assert_eq!(encoder.offset(3, 3), 45);
    }

    #[test]
    fn test_mismatched_frame() {
        let mut encoder = encoder(4, "GRB");
        let frame = ColorFrame::new(5, 3);
        assert!(matches!(encoder.encode(&frame), Err(Error::InvalidConfig(_))));
        let frame = ColorFrame::new(4, 4);
        assert!(encoder.encode(&frame).is_err());
        // the internal buffer survives a rejected frame
        let expected_len = encoder.buffer_len();
        let frame = encoder.new_frame();
        assert_eq!(encoder.encode(&frame).unwrap().len(), expected_len);
    }

    #[test]
    fn test_wrong_sized_buffer_is_replaced() {
        let encoder = encoder(2, "RGB");
        let mut buffer = OutputBuffer::zeroed(3);
        encoder.encode_into(&encoder.new_frame(), &mut buffer).unwrap();
        assert_eq!(buffer.len(), encoder.buffer_len());
    }
}
