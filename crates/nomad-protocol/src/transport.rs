//! Device channel abstraction
//!
//! The player exposes one control sub-channel for short vendor requests
//! and a pair of bulk sub-channels for payloads. A [`Transport`] bundles
//! all three into a single exclusive session; the engine receives it
//! explicitly for every operation and never opens or configures it.

use std::time::Duration;

use crate::command::ControlRequest;
use crate::error::TransportError;

/// Synchronous request/response channel to one player
///
/// Implementations block until the request completes or their timeout
/// expires; a timeout is reported as [`TransportError::Timeout`]. The
/// device is a stateful session with no request IDs, so one transport
/// must never carry two interleaved transactions.
pub trait Transport {
    /// Issue a vendor read; the device fills `buf` (`request.length` bytes)
    fn control_in(&mut self, request: &ControlRequest, buf: &mut [u8])
        -> Result<(), TransportError>;

    /// Issue a vendor write carrying `payload` (`request.length` bytes)
    fn control_out(&mut self, request: &ControlRequest, payload: &[u8])
        -> Result<(), TransportError>;

    /// Write to the bulk-out sub-channel, returning the bytes accepted
    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read from the bulk-in sub-channel into `buf`, returning the bytes received
    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Apply a per-call timeout to subsequent requests
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn control_in(
        &mut self,
        request: &ControlRequest,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        (**self).control_in(request, buf)
    }

    fn control_out(
        &mut self,
        request: &ControlRequest,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        (**self).control_out(request, payload)
    }

    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).bulk_write(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).bulk_read(buf)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_timeout(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn control_in(
        &mut self,
        request: &ControlRequest,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        (**self).control_in(request, buf)
    }

    fn control_out(
        &mut self,
        request: &ControlRequest,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        (**self).control_out(request, payload)
    }

    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).bulk_write(data)
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).bulk_read(buf)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_timeout(timeout)
    }
}
