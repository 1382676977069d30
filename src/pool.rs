//! Sequential failover across candidate hosts.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::{ConfigError, TransportError},
    options::TransportOptions,
    transport::Transport,
};

/// Ordered list of hosts sharing one set of transport options.
///
/// Candidates are dialled one at a time in configuration order; the first
/// successful connection wins.
///
/// # Examples
///
/// ```no_run
/// use wiresock::{ConnectionPool, TransportKind, TransportOptions};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let options = TransportOptions::builder(TransportKind::Tcp).port(389).build()?;
/// let pool = ConnectionPool::new(["ldap1.example.com", "ldap2.example.com"], options)?;
/// let transport = pool.connect(None).await?;
/// println!("connected to {}", transport.peer());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    candidates: Vec<String>,
    options: Arc<TransportOptions>,
}

impl ConnectionPool {
    /// Create a pool over `candidates`, tried in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoCandidates`] if `candidates` is empty.
    pub fn new<I, H>(candidates: I, options: TransportOptions) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        if candidates.is_empty() {
            return Err(ConfigError::NoCandidates);
        }
        Ok(Self {
            candidates,
            options: Arc::new(options),
        })
    }

    /// Hosts in the order they are attempted.
    #[must_use]
    pub fn candidates(&self) -> &[String] { &self.candidates }

    /// Options applied to every connection attempt.
    #[must_use]
    pub fn options(&self) -> &TransportOptions { &self.options }

    /// Connect to `host`, or to the first reachable candidate when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Exhausted`] naming every attempted host and
    /// wrapping the final failure if no attempt succeeded.
    pub async fn connect(&self, host: Option<&str>) -> Result<Transport, TransportError> {
        let hosts: Vec<&str> = match host {
            Some(host) => vec![host],
            None => self.candidates.iter().map(String::as_str).collect(),
        };

        let mut last_err = None;
        for host in &hosts {
            let mut transport = Transport::with_shared_options(Arc::clone(&self.options));
            match transport.connect(host).await {
                Ok(()) => return Ok(transport),
                Err(err) => {
                    debug!(host = %host, error = %err, "candidate failed");
                    last_err = Some(err);
                }
            }
        }

        let hosts: Vec<String> = hosts.into_iter().map(str::to_owned).collect();
        warn!(hosts = %hosts.join(","), "no candidate accepted a connection");
        Err(TransportError::Exhausted {
            hosts,
            last: Box::new(last_err.unwrap_or(TransportError::NotConnected)),
        })
    }
}
