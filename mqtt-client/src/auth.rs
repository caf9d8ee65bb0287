//! The `Authenticator` external contract: credential refresh
//! invoked by the reconnect engine before each reconnect attempt, modeled as
//! an injected capability rather than the original's process-wide globals
//! (`iotx_get_device_info`/`iotx_get_user_info`).

use mqtt_core::Error;

/// Refreshes authentication material ahead of a (re)connect attempt.
pub trait Authenticator {
    /// Performs whatever refresh is needed (token renewal, device-info
    /// lookup, ...). Failure aborts the current reconnect attempt without
    /// advancing the backoff; the already-elapsed deadline is retried on the
    /// next `yield_now` call.
    fn authenticate(&mut self) -> Result<(), Error>;
}

/// An [`Authenticator`] that never needs to refresh anything, for brokers
/// using static username/password credentials baked into `ClientConfig`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthenticator;

impl Authenticator for NoopAuthenticator {
    fn authenticate(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
