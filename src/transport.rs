#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::time::Duration;

use serialport::SerialPort;
#[cfg(target_os = "linux")]
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use tracing::{debug, warn};

use crate::config::OutputConfig;
use crate::error::TransportError;

/// Write timeout for serial bridges
const SERIAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Largest single spidev transfer unless the module was loaded with another
/// `bufsiz`
const SPIDEV_DEFAULT_BUFSIZ: usize = 4096;

#[cfg(target_os = "linux")]
const SPIDEV_BUFSIZ_PARAM: &str = "/sys/module/spidev/parameters/bufsiz";

/// Whatever moves an encoded buffer onto the wire.
///
/// `write` blocks until the whole buffer is out or fails. The buffer is
/// borrowed read only for the duration of the call and is not interpreted.
pub trait Transport: Send {
    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        (**self).write(buf)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        (**self).write(buf)
    }
}

/// Transport over anything implementing [`io::Write`]: a SPI device node,
/// a serial port, or a `Vec<u8>` in tests.
#[derive(Debug)]
pub struct IoTransport<W> {
    inner: W,
    max_write: usize,
}

impl<W: Write + Send> IoTransport<W> {
    pub fn new(inner: W) -> Self {
        IoTransport {
            inner,
            max_write: usize::MAX,
        }
    }

    /// Hand the device at most `max_write` bytes per `write` call.
    ///
    /// spidev rejects a single write larger than its transfer buffer, so
    /// long frames go out as several back to back transfers.
    pub fn with_max_write(inner: W, max_write: usize) -> Self {
        IoTransport {
            inner,
            max_write: max_write.max(1),
        }
    }

    pub fn max_write(&self) -> usize {
        self.max_write
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Transport for IoTransport<W> {
    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let expected = buf.len();
        let mut written = 0;

        // write_all, but keeping count so a short write can be reported as such
        while written < expected {
            let chunk = (expected - written).min(self.max_write);
            match self.inner.write(&buf[written..written + chunk]) {
                Ok(0) => return Err(TransportError::PartialWrite { written, expected }),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(if written == 0 {
                        TransportError::Busy
                    } else {
                        TransportError::PartialWrite { written, expected }
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.inner.flush()?;
        Ok(())
    }
}

/// Open a SPI device node such as `/dev/spidev1.0` and clock it at
/// `clock_hz`, mode 0, most significant bit first.
///
/// The bus speed has to be the clock rate the timing model was built for.
/// Writes are split at the driver's `bufsiz` (4096 bytes unless the module
/// parameter says otherwise).
#[cfg(target_os = "linux")]
pub fn open_spidev(device: &str, clock_hz: u32) -> Result<IoTransport<Spidev>, TransportError> {
    let mut spi = Spidev::open(device)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(clock_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .lsb_first(false)
        .build();
    spi.configure(&options)?;

    let bufsiz = spidev_bufsiz(fs::read_to_string(SPIDEV_BUFSIZ_PARAM).ok().as_deref());
    debug!(device, clock_hz, bufsiz, "opened spi device");
    Ok(IoTransport::with_max_write(spi, bufsiz))
}

/// Transfer limit from the spidev `bufsiz` module parameter
fn spidev_bufsiz(param: Option<&str>) -> usize {
    param
        .and_then(|text| text.trim().parse::<usize>().ok())
        .filter(|&size| size > 0)
        .unwrap_or(SPIDEV_DEFAULT_BUFSIZ)
}

/// Open a serial link to a bridge that shifts received bytes out unchanged
pub fn open_serial(device: &str, baud_rate: u32) -> Result<IoTransport<Box<dyn SerialPort>>, TransportError> {
    let mut port = serialport::new(device, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(SERIAL_TIMEOUT)
        .open()
        .map_err(io::Error::from)?;

    // some bridges only start forwarding once DTR is up
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!(device, error = %e, "failed to set DTR");
    }

    debug!(device, baud_rate, "opened serial port");
    Ok(IoTransport::new(port))
}

/// Open whichever device the configuration names. A SPI bus is set to
/// `clock_hz`, a serial port runs at its configured baud rate.
pub fn open(config: &OutputConfig, clock_hz: u32) -> Result<Box<dyn Transport>, TransportError> {
    let transport: Box<dyn Transport> = match config {
        #[cfg(target_os = "linux")]
        OutputConfig::Spidev { device } => Box::new(open_spidev(device, clock_hz)?),
        #[cfg(not(target_os = "linux"))]
        OutputConfig::Spidev { .. } => {
            let _ = clock_hz;
            return Err(io::Error::new(ErrorKind::Unsupported, "spidev is only available on Linux").into());
        }
        OutputConfig::Serial { device, baud_rate } => Box::new(open_serial(device, *baud_rate)?),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes per call, then fails with `error` once
    /// `capacity` is reached.
    struct Choppy {
        data: Vec<u8>,
        limit: usize,
        capacity: usize,
        error: ErrorKind,
    }

    /// Like spidev: a write longer than `bufsiz` fails outright
    struct Bounded {
        calls: Vec<usize>,
        bufsiz: usize,
    }

    impl Write for Bounded {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.bufsiz {
                return Err(io::Error::new(ErrorKind::InvalidInput, "message too long"));
            }
            self.calls.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Write for Choppy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.data.len();
            if room == 0 {
                return Err(io::Error::from(self.error));
            }
            let n = buf.len().min(self.limit).min(room);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn choppy(capacity: usize, error: ErrorKind) -> IoTransport<Choppy> {
        IoTransport::new(Choppy {
            data: Vec::new(),
            limit: 4,
            capacity,
            error,
        })
    }

    #[test]
    fn test_short_writes_are_completed() {
        let mut transport = choppy(100, ErrorKind::Other);
        transport.write(&[1; 10]).unwrap();
        assert_eq!(transport.get_ref().data, vec![1; 10]);
    }

    #[test]
    fn test_busy_before_any_byte() {
        let mut transport = choppy(0, ErrorKind::WouldBlock);
        assert!(matches!(transport.write(&[1; 10]), Err(TransportError::Busy)));
    }

    #[test]
    fn test_partial_write() {
        let mut transport = choppy(6, ErrorKind::TimedOut);
        let err = transport.write(&[1; 10]).unwrap_err();
        assert!(matches!(err, TransportError::PartialWrite { written: 6, expected: 10 }));
    }

    #[test]
    fn test_io_error_passes_through() {
        let mut transport = choppy(2, ErrorKind::BrokenPipe);
        match transport.write(&[1; 10]) {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_vec_transport() {
        let mut transport = IoTransport::new(Vec::<u8>::new());
        let mut boxed: Box<dyn Transport> = Box::new(IoTransport::new(Vec::<u8>::new()));
        transport.write(&[1, 2, 3]).unwrap();
        boxed.write(&[4]).unwrap();
        assert_eq!(transport.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_large_frame_is_split_at_bufsiz() {
        let bounded = Bounded {
            calls: Vec::new(),
            bufsiz: 4096,
        };
        // 196 LEDs at ratio 7 plus 41 bytes of padding
        let frame = vec![0u8; 196 * 3 * 7 + 41];

        let mut unbounded = IoTransport::new(Bounded {
            calls: Vec::new(),
            bufsiz: 4096,
        });
        assert!(matches!(unbounded.write(&frame), Err(TransportError::Io(_))));

        let mut transport = IoTransport::with_max_write(bounded, 4096);
        transport.write(&frame).unwrap();
        assert_eq!(transport.get_ref().calls, vec![4096, 61]);
    }

    #[test]
    fn test_spidev_bufsiz() {
        assert_eq!(spidev_bufsiz(Some("65536\n")), 65536);
        assert_eq!(spidev_bufsiz(Some("0")), SPIDEV_DEFAULT_BUFSIZ);
        assert_eq!(spidev_bufsiz(Some("junk")), SPIDEV_DEFAULT_BUFSIZ);
        assert_eq!(spidev_bufsiz(None), SPIDEV_DEFAULT_BUFSIZ);
        assert_eq!(IoTransport::with_max_write(Vec::<u8>::new(), 0).max_write(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_device() {
        assert!(matches!(
            open_spidev("/nonexistent/spidev9.9", 2_400_000),
            Err(TransportError::Io(_))
        ));
    }
}
