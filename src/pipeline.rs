use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;

use tracing::{trace, warn};

use crate::encoder::{FrameEncoder, OutputBuffer};
use crate::error::{Result, TransportError};
use crate::frame::ColorFrame;
use crate::transport::Transport;

/// Where a frame is in its trip to the LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Encoding,
    Transmitting,
}

fn transition(state: &mut FrameState, next: FrameState) {
    trace!(from = ?*state, to = ?next, "frame state");
    *state = next;
}

fn hex_preview(bytes: &[u8], max: usize) -> String {
    bytes
        .iter()
        .take(max)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Encode then transmit, one frame at a time on the calling thread.
pub struct Strip<T> {
    encoder: FrameEncoder,
    transport: T,
    state: FrameState,
    frames_sent: u64,
}

impl<T: Transport> Strip<T> {
    pub fn new(encoder: FrameEncoder, transport: T) -> Self {
        Strip {
            encoder,
            transport,
            state: FrameState::Idle,
            frames_sent: 0,
        }
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// A dark frame shaped for this strip
    pub fn new_frame(&self) -> ColorFrame {
        self.encoder.new_frame()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Encode `frame` and block until the transport has written it
    pub fn show(&mut self, frame: &ColorFrame) -> Result<()> {
        transition(&mut self.state, FrameState::Encoding);
        let bytes = match self.encoder.encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                transition(&mut self.state, FrameState::Idle);
                return Err(e);
            }
        };
        trace!(len = bytes.len(), head = %hex_preview(bytes, 24), "frame encoded");

        transition(&mut self.state, FrameState::Transmitting);
        let result = self.transport.write(bytes);
        transition(&mut self.state, FrameState::Idle);

        result?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Turn every LED off
    pub fn clear(&mut self) -> Result<()> {
        let frame = self.encoder.new_frame();
        self.show(&frame)
    }

    pub fn into_parts(self) -> (FrameEncoder, T) {
        (self.encoder, self.transport)
    }
}

type Returned = (OutputBuffer, Result<(), TransportError>);

/// Double buffered output: the next frame is encoded while the previous one
/// is still being written.
///
/// A dedicated thread owns the transport. Buffers travel to it through a
/// bounded channel and come back with the result of their write, so a
/// buffer is only ever held by one side. A failed write is reported by the
/// next [`submit`](Pipeline::submit) or [`flush`](Pipeline::flush).
pub struct Pipeline {
    encoder: FrameEncoder,
    free: Vec<OutputBuffer>,
    in_flight: usize,
    sender: Option<SyncSender<OutputBuffer>>,
    returns: Receiver<Returned>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Pipeline {
    pub fn new<T: Transport + 'static>(encoder: FrameEncoder, transport: T) -> Self {
        Self::with_buffers(encoder, transport, 2)
    }

    /// `buffers` output buffers are allocated up front, at least one
    pub fn with_buffers<T: Transport + 'static>(encoder: FrameEncoder, transport: T, buffers: usize) -> Self {
        let buffers = buffers.max(1);
        let free = (0..buffers).map(|_| encoder.new_buffer()).collect();

        // never more than `buffers` in flight, so sends do not block
        let (sender, receiver) = mpsc::sync_channel::<OutputBuffer>(buffers);
        let (return_sender, returns) = mpsc::channel::<Returned>();

        let worker = thread::spawn(move || {
            transmit_worker(transport, receiver, return_sender);
        });

        Pipeline {
            encoder,
            free,
            in_flight: 0,
            sender: Some(sender),
            returns,
            worker: Some(worker),
        }
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    pub fn new_frame(&self) -> ColorFrame {
        self.encoder.new_frame()
    }

    /// Buffers currently owned by the transmit thread
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Encode `frame` into a free buffer and hand it to the transmit thread.
    ///
    /// Blocks while every buffer is still being transmitted.
    pub fn submit(&mut self, frame: &ColorFrame) -> Result<()> {
        let mut buffer = match self.free.pop() {
            Some(buffer) => buffer,
            None => self.reclaim()?,
        };

        if let Err(e) = self.encoder.encode_into(frame, &mut buffer) {
            self.free.push(buffer);
            return Err(e);
        }

        let Some(sender) = self.sender.as_ref() else {
            self.free.push(buffer);
            return Err(TransportError::Closed.into());
        };
        if let Err(mpsc::SendError(buffer)) = sender.send(buffer) {
            self.free.push(buffer);
            return Err(TransportError::Closed.into());
        }

        self.in_flight += 1;
        Ok(())
    }

    /// Wait for every submitted frame to be written, returning the first error
    pub fn flush(&mut self) -> Result<()> {
        let mut first_error = None;
        while self.in_flight > 0 {
            match self.reclaim() {
                Ok(buffer) => self.free.push(buffer),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Take back the oldest buffer from the transmit thread
    fn reclaim(&mut self) -> Result<OutputBuffer> {
        if self.in_flight == 0 {
            return Err(TransportError::Closed.into());
        }

        let Ok((buffer, result)) = self.returns.recv() else {
            // the transmit thread is gone and took every buffer it held with it
            self.in_flight = 0;
            return Err(TransportError::Closed.into());
        };
        self.in_flight -= 1;

        match result {
            Ok(()) => Ok(buffer),
            Err(e) => {
                self.free.push(buffer);
                Err(e.into())
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // closing the channel ends the worker once queued frames are out
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Transmit thread: write each buffer, then send it back with the outcome
fn transmit_worker<T: Transport>(mut transport: T, receiver: Receiver<OutputBuffer>, returns: Sender<Returned>) {
    for buffer in receiver {
        let result = transport.write(buffer.as_bytes());
        match &result {
            Ok(()) => trace!(len = buffer.len(), "frame transmitted"),
            Err(e) => warn!(error = %e, "frame transmit failed"),
        }

        if returns.send((buffer, result)).is_err() {
            break;
        }
    }
}
