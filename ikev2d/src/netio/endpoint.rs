//! A bound UDP socket with its receive and send loops.
//!
//! The receive loop parks on a private [`Poller`] watching the socket and the
//! endpoint's stop [`Notifier`]. When the socket is readable it reads up to
//! [`MAX_DATAGRAMS_PER_WAKEUP`] datagrams, wraps each in a [`PacketRecord`] and
//! pushes it onto the family's shared receive queue. The send loop pops the
//! family's shared send queue and writes each record to its peer until that
//! queue is closed.
//!
//! Both loops run as pool tasks over one `Arc<Endpoint<F>>`. A socket error
//! ends only the loop that hit it; the error comes back through that task's
//! handle.

use super::config::NetIoConfig;
use super::family::{AddressFamily, Family};
use super::packet::PacketRecord;
use super::socket::create_udp_socket;
use crate::error::{Error, Result};
use crate::reactor::{Notifier, NotifierFlags, Poller, Readiness, Trigger, STOP_SIGNAL};
use crate::sync::BlockingQueue;
use crate::telemetry::{record_metric, MetricsEvent};
use socket2::{SockAddr, Socket};
use std::io;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Queue type shared between endpoints and session managers.
pub type PacketQueue = BlockingQueue<PacketRecord>;

/// Upper bound on reads per readiness report, so a busy socket cannot keep
/// the loop from seeing its stop notifier.
pub const MAX_DATAGRAMS_PER_WAKEUP: usize = 32;

/// The per-family queues an endpoint feeds and drains.
#[derive(Debug, Clone)]
pub struct EndpointQueues {
    pub inbound: Arc<PacketQueue>,
    pub outbound: Arc<PacketQueue>,
}

pub struct Endpoint<F: AddressFamily> {
    id: usize,
    socket: Socket,
    local_addr: SocketAddr,
    stop: Notifier,
    stopped: AtomicBool,
    queues: EndpointQueues,
    recv_buffer_size: usize,
    _family: PhantomData<fn() -> F>,
}

impl<F: AddressFamily> Endpoint<F> {
    /// Resolve `host`, bind the first address of family `F` and record the
    /// bound local address.
    pub fn bind(
        id: usize,
        host: &str,
        port: u16,
        config: &NetIoConfig,
        queues: EndpointQueues,
    ) -> Result<Self> {
        let bind_addr = F::resolve(host, port)?;
        let socket = create_udp_socket(bind_addr, config)?;
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| Error::Endpoint {
                family: F::NAME,
                id,
                reason: "bound socket has no IP address".to_string(),
            })?;
        let stop = Notifier::new(0, NotifierFlags::SEMAPHORE)?;

        info!(
            family = F::NAME,
            endpoint_id = id,
            %local_addr,
            reuse_port = config.reuse_port,
            "Endpoint bound"
        );

        Ok(Self {
            id,
            socket,
            local_addr,
            stop,
            stopped: AtomicBool::new(false),
            queues,
            recv_buffer_size: config.recv_buffer_size,
            _family: PhantomData,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the receive loop has exited on a stop request.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Ask the receive loop to exit.
    pub fn stop(&self) -> io::Result<()> {
        debug!(family = F::NAME, endpoint_id = self.id, "Endpoint stop requested");
        self.stop.notify(STOP_SIGNAL)
    }

    /// Read datagrams into the receive queue until stopped.
    pub fn receive_loop(&self) -> Result<()> {
        let poller = Poller::new(format!("{}-endpoint-{}", F::NAME, self.id))?;
        let socket_fd = self.socket.as_raw_fd();
        let stop_fd = self.stop.as_raw_fd();
        poller.add(socket_fd, Trigger::Level)?;
        poller.add(stop_fd, Trigger::Level)?;

        let mut buf = vec![MaybeUninit::<u8>::uninit(); self.recv_buffer_size];

        record_metric(MetricsEvent::EndpointStarted);
        info!(family = F::NAME, endpoint_id = self.id, local_addr = %self.local_addr, "Receive loop started");

        let outcome = loop {
            match poller.wait() {
                Ok(Readiness::Readable(fd)) if fd == socket_fd => {
                    if let Err(e) = self.read_datagrams(&mut buf) {
                        break Err(e);
                    }
                }
                Ok(Readiness::Readable(fd)) if fd == stop_fd => match self.stop.wait(STOP_SIGNAL) {
                    Ok(true) => {
                        self.stopped.store(true, Ordering::Release);
                        break Ok(());
                    }
                    Ok(false) => debug!(endpoint_id = self.id, "Ignoring non-stop notification"),
                    Err(e) => break Err(e.into()),
                },
                Ok(Readiness::Readable(fd)) => {
                    warn!(family = F::NAME, endpoint_id = self.id, fd, "Unknown descriptor polled");
                }
                Ok(Readiness::Closed(fd)) if fd == socket_fd || fd == stop_fd => {
                    break Err(self.failure(format!("descriptor {} reported error or hang-up", fd)));
                }
                Ok(Readiness::Closed(fd)) => {
                    warn!(family = F::NAME, endpoint_id = self.id, fd, "Unknown descriptor closed");
                }
                Ok(Readiness::Idle) => {}
                Err(e) => break Err(e.into()),
            }
        };

        record_metric(MetricsEvent::EndpointStopped);
        match &outcome {
            Ok(()) => info!(family = F::NAME, endpoint_id = self.id, "Receive loop stopped"),
            Err(e) => error!(family = F::NAME, endpoint_id = self.id, error = %e, "Receive loop failed"),
        }
        outcome
    }

    fn read_datagrams(&self, buf: &mut [MaybeUninit<u8>]) -> Result<()> {
        for _ in 0..MAX_DATAGRAMS_PER_WAKEUP {
            let (len, source) = match self.socket.recv_from_with_flags(buf, libc::MSG_DONTWAIT) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    // Deferred ICMP error from an earlier send; the socket is fine.
                    record_metric(MetricsEvent::NetworkReceiveError);
                    debug!(endpoint_id = self.id, error = %e, "Ignoring ICMP error on receive");
                    continue;
                }
                Err(e) => {
                    record_metric(MetricsEvent::NetworkReceiveError);
                    return Err(self.failure(format!("receive failed: {}", e)));
                }
            };

            let peer = match source.as_socket() {
                Some(peer) => peer,
                None => {
                    warn!(endpoint_id = self.id, "Datagram from non-IP source dropped");
                    continue;
                }
            };

            // SAFETY: recvfrom initialised the first `len` bytes of `buf`.
            let data = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };
            let record = PacketRecord::copy_from(peer, data);

            trace!(endpoint_id = self.id, peer = %record.key(), len, "Datagram received");
            record_metric(MetricsEvent::PacketReceived { bytes: len });

            if !self.queues.inbound.push(Arc::new(record)) {
                debug!(endpoint_id = self.id, "Receive queue closed, datagram dropped");
            }
        }
        Ok(())
    }

    /// Write queued records to their peers until the send queue closes.
    pub fn send_loop(&self) -> Result<()> {
        info!(family = F::NAME, endpoint_id = self.id, "Send loop started");

        while let Some(record) = self.queues.outbound.pop() {
            if !F::accepts(&record.peer()) {
                warn!(
                    family = F::NAME,
                    endpoint_id = self.id,
                    peer = %record.key(),
                    "Outbound record for another address family dropped"
                );
                continue;
            }

            if let Err(e) = self.send_record(&record) {
                record_metric(MetricsEvent::NetworkSendError);
                let err = self.failure(format!("send to {} failed: {}", record.peer(), e));
                error!(family = F::NAME, endpoint_id = self.id, error = %err, "Send loop failed");
                return Err(err);
            }
        }

        info!(family = F::NAME, endpoint_id = self.id, "Send loop stopped, queue closed");
        Ok(())
    }

    fn send_record(&self, record: &PacketRecord) -> io::Result<()> {
        let dest = SockAddr::from(record.peer());
        loop {
            match self.socket.send_to(record.payload(), &dest) {
                Ok(sent) => {
                    trace!(endpoint_id = self.id, peer = %record.key(), sent, "Datagram sent");
                    record_metric(MetricsEvent::PacketSent { bytes: sent });
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn failure(&self, reason: String) -> Error {
        Error::Endpoint {
            family: F::NAME,
            id: self.id,
            reason,
        }
    }
}

impl<F: AddressFamily> std::fmt::Debug for Endpoint<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("family", &F::NAME)
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Family-erased view of a running endpoint, for code that manages
/// endpoints of both families together.
pub trait EndpointControl: Send + Sync {
    fn id(&self) -> usize;
    fn family(&self) -> Family;
    fn local_addr(&self) -> SocketAddr;
    /// Ask the receive loop to exit.
    fn stop(&self) -> io::Result<()>;
}

impl<F: AddressFamily> EndpointControl for Endpoint<F> {
    fn id(&self) -> usize {
        self.id
    }

    fn family(&self) -> Family {
        F::FAMILY
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stop(&self) -> io::Result<()> {
        Endpoint::stop(self)
    }
}
