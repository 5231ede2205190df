//! Transport plumbing shared by every operation
//!
//! The helpers here issue one step of a transaction, log it, and turn a
//! wrong byte count into [`NomadError::ShortRead`] or
//! [`NomadError::ShortWrite`] so callers never see a partial buffer.

use std::thread;
use std::time::Duration;

use nomad_protocol::{ControlRequest, Transport, TransportError};
use tracing::{debug, trace};

use crate::error::{NomadError, Result};

/// Transport adapter that pauses before every control request
///
/// The player drops vendor requests that arrive back to back; the stock
/// firmware needs about 400µs between them.
#[derive(Debug)]
pub struct Paced<T> {
    inner: T,
    delay: Duration,
}

impl<T: Transport> Paced<T> {
    pub fn new(inner: T, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

impl<T: Transport> Transport for Paced<T> {
    fn control_in(
        &mut self,
        request: &ControlRequest,
        buf: &mut [u8],
    ) -> std::result::Result<(), TransportError> {
        self.pause();
        self.inner.control_in(request, buf)
    }

    fn control_out(
        &mut self,
        request: &ControlRequest,
        payload: &[u8],
    ) -> std::result::Result<(), TransportError> {
        self.pause();
        self.inner.control_out(request, payload)
    }

    fn bulk_write(&mut self, data: &[u8]) -> std::result::Result<usize, TransportError> {
        self.inner.bulk_write(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        self.inner.bulk_read(buf)
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::result::Result<(), TransportError> {
        self.inner.set_timeout(timeout)
    }
}

/// Issue a vendor read and return its data stage
pub(crate) fn control_read<T: Transport + ?Sized>(
    transport: &mut T,
    request: ControlRequest,
) -> Result<Vec<u8>> {
    debug!("{}", request);
    let mut buf = vec![0u8; usize::from(request.length)];
    transport
        .control_in(&request, &mut buf)
        .map_err(|e| NomadError::transport(request.command.name(), e))?;
    Ok(buf)
}

/// Issue a vendor write carrying `payload`
pub(crate) fn control_write<T: Transport + ?Sized>(
    transport: &mut T,
    request: ControlRequest,
    payload: &[u8],
) -> Result<()> {
    debug!("{}", request);
    transport
        .control_out(&request, payload)
        .map_err(|e| NomadError::transport(request.command.name(), e))
}

/// Poll the device for readiness before the next transfer step
pub(crate) fn file_ack<T: Transport + ?Sized>(transport: &mut T) -> Result<()> {
    control_read(transport, ControlRequest::file_ack()).map(|_| ())
}

/// Fill `buf` from the bulk-in sub-channel in one read
pub(crate) fn read_exact_bulk<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
    operation: &'static str,
    offset: u64,
) -> Result<()> {
    let actual = transport
        .bulk_read(buf)
        .map_err(|e| NomadError::transport(operation, e))?;
    trace!("{}: bulk read {} of {} bytes", operation, actual, buf.len());
    if actual != buf.len() {
        return Err(NomadError::ShortRead {
            operation,
            expected: buf.len(),
            actual,
            offset,
        });
    }
    Ok(())
}

/// Read a fixed-size response from the bulk-in sub-channel
pub(crate) fn read_response<T: Transport + ?Sized>(
    transport: &mut T,
    len: usize,
    operation: &'static str,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact_bulk(transport, &mut buf, operation, 0)?;
    Ok(buf)
}

/// Send `data` on the bulk-out sub-channel in one write
pub(crate) fn write_all_bulk<T: Transport + ?Sized>(
    transport: &mut T,
    data: &[u8],
    operation: &'static str,
    offset: u64,
) -> Result<()> {
    let actual = transport
        .bulk_write(data)
        .map_err(|e| NomadError::transport(operation, e))?;
    trace!("{}: bulk wrote {} of {} bytes", operation, actual, data.len());
    if actual != data.len() {
        return Err(NomadError::ShortWrite {
            operation,
            expected: data.len(),
            actual,
            offset,
        });
    }
    Ok(())
}
