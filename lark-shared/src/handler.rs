//! The sans-IO seam every long-running protocol object in this workspace
//! implements.
//!
//! A [`Protocol`] performs no I/O. The caller feeds it inbound bytes or
//! messages (`handle_read`), outbound requests (`handle_write`), out-of-band
//! events (`handle_event`) and the current time (`handle_timeout`), then
//! drains whatever the state machine produced with the matching `poll_*`
//! methods. Driving loops decide where bytes come from and go to; the
//! protocol object only decides what they mean.

/// A sans-IO protocol state machine.
///
/// `Rin`/`Win`/`Ein` are the inbound, outbound and event input types; the
/// associated types name what comes back out. Implementations queue outputs
/// internally and release them through `poll_read`/`poll_write`/`poll_event`.
pub trait Protocol<Rin, Win, Ein> {
    /// Read output handed to the next inbound stage (or the application)
    type Rout;
    /// Write output handed to the next outbound stage (or the wire)
    type Wout;
    /// Event output
    type Eout;
    /// Error type
    type Error;
    /// Time type driving `handle_timeout`/`poll_timeout`
    type Time;

    /// Handles an inbound message
    fn handle_read(&mut self, msg: Rin) -> Result<(), Self::Error>;

    /// Polls an inbound output from the internal queue
    fn poll_read(&mut self) -> Option<Self::Rout>;

    /// Handles an outbound message
    fn handle_write(&mut self, msg: Win) -> Result<(), Self::Error>;

    /// Polls an outbound output from the internal queue
    fn poll_write(&mut self) -> Option<Self::Wout>;

    /// Handles an event
    fn handle_event(&mut self, _evt: Ein) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Polls an event
    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    /// Handles a timeout previously scheduled via `poll_timeout`
    fn handle_timeout(&mut self, _now: Self::Time) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Polls the next instant at which `handle_timeout` must be called
    fn poll_timeout(&mut self) -> Option<Self::Time> {
        None
    }

    /// Closes the protocol object; further operations fail or are ignored
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
