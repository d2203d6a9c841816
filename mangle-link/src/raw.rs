//! Raw link-layer sockets (`AF_PACKET`).
//!
//! Interfaces are looked up through [`pnet::datalink`]. Each opened link owns one packet socket
//! bound to the interface, shared by the sender and a dedicated receive thread. The kernel
//! reports the packet type of every received frame: copies of frames sent out of the interface
//! (by this engine or anyone else on the host) arrive as `PACKET_OUTGOING` and are reported as
//! [`Direction::Egress`].

use std::{
    fmt, io, mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use bytes::BytesMut;
use pnet::datalink;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace};

use crate::{Binder, Direction, Frame, Link, LinkError};

const SOL_PACKET: libc::c_int = 263;
const PACKET_ADD_MEMBERSHIP: libc::c_int = 1;
const PACKET_MR_PROMISC: libc::c_ushort = 1;
/// `sll_pkttype` of frames leaving the host.
const PACKET_OUTGOING: u8 = 4;

/// Enough for any frame up to a 64 KiB MTU.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

#[repr(C)]
struct PacketMreq {
    mr_ifindex: libc::c_int,
    mr_type: libc::c_ushort,
    mr_alen: libc::c_ushort,
    mr_address: [libc::c_uchar; 8],
}

#[derive(Debug, Clone)]
pub struct Config {
    /// How long the receive thread blocks before checking whether the link was closed.
    pub read_timeout: Duration,
    /// Whether to put the interface in promiscuous mode.
    pub promiscuous: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { read_timeout: Duration::from_millis(100), promiscuous: true }
    }
}

impl Config {
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }
}

/// Opens raw packet sockets, one per interface.
///
/// Needs `CAP_NET_RAW`.
#[derive(Debug)]
pub struct RawBinder {
    config: Config,
    to_engine: mpsc::Sender<Frame>,
}

impl RawBinder {
    pub fn new(to_engine: mpsc::Sender<Frame>) -> Self {
        Self::with_config(to_engine, Config::default())
    }

    pub fn with_config(to_engine: mpsc::Sender<Frame>, config: Config) -> Self {
        Self { config, to_engine }
    }
}

impl Binder for RawBinder {
    fn open(&mut self, name: &str) -> Result<Arc<dyn Link>, LinkError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| LinkError::NoSuchInterface(name.to_string()))?;

        let ifindex = libc::c_int::try_from(iface.index)
            .map_err(|_| LinkError::NoSuchInterface(name.to_string()))?;

        let socket = PacketSocket::bind(ifindex)?;
        socket.set_read_timeout(self.config.read_timeout)?;
        if self.config.promiscuous {
            socket.set_promiscuous(ifindex)?;
        }

        let socket = Arc::new(socket);
        let closed = Arc::new(AtomicBool::new(false));

        let receiver = Receiver {
            iface: Arc::from(name),
            socket: Arc::clone(&socket),
            closed: Arc::clone(&closed),
            to_engine: self.to_engine.clone(),
        };

        thread::Builder::new()
            .name(format!("mangle-rx-{name}"))
            .spawn(move || receiver.run())?;

        info!(iface = %name, ifindex, mac = ?iface.mac, "opened raw link");

        Ok(Arc::new(RawLink { name: name.to_string(), socket, closed }))
    }
}

/// An `AF_PACKET` socket bound to one interface.
#[derive(Debug)]
struct PacketSocket {
    fd: OwnedFd,
}

impl PacketSocket {
    fn bind(ifindex: libc::c_int) -> io::Result<Self> {
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW | libc::SOCK_CLOEXEC, protocol as i32) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just returned by `socket` and is owned by nothing else.
        let socket = Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } };

        let sll = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: protocol,
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };

        let ret = unsafe {
            libc::bind(
                socket.fd.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(socket)
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        // A zero timeval would block forever.
        let timeout = timeout.max(Duration::from_millis(1));
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        self.setsockopt(libc::SOL_SOCKET, libc::SO_RCVTIMEO, &tv)
    }

    fn set_promiscuous(&self, ifindex: libc::c_int) -> io::Result<()> {
        let mreq = PacketMreq { mr_ifindex: ifindex, mr_type: PACKET_MR_PROMISC, mr_alen: 0, mr_address: [0; 8] };
        self.setsockopt(SOL_PACKET, PACKET_ADD_MEMBERSHIP, &mreq)
    }

    fn setsockopt<T>(&self, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                level,
                name,
                value as *const T as *const libc::c_void,
                mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        let len = unsafe { libc::send(self.fd.as_raw_fd(), frame.as_ptr() as *const libc::c_void, frame.len(), 0) };
        if len < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(len as usize)
    }

    /// Receives one frame into `buf`, returning its length and the kernel's packet type.
    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, u8)> {
        // SAFETY: all-zero is a valid `sockaddr_ll`.
        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut sll_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        let len = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut sll as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                &mut sll_len,
            )
        };
        if len < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((len as usize, sll.sll_pkttype))
    }
}

fn direction(pkttype: u8) -> Direction {
    if pkttype == PACKET_OUTGOING {
        Direction::Egress
    } else {
        Direction::Ingress
    }
}

/// A raw socket bound to one interface.
pub struct RawLink {
    name: String,
    socket: Arc<PacketSocket>,
    /// Shared with the receive thread, set on drop.
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for RawLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawLink").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Link for RawLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, frame: &[u8]) -> Result<(), LinkError> {
        match self.socket.send(frame) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => Err(LinkError::BufferFull),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RawLink {
    fn drop(&mut self) {
        debug!(iface = %self.name, "closing raw link");
        self.closed.store(true, Ordering::Relaxed);
    }
}

struct Receiver {
    iface: Arc<str>,
    socket: Arc<PacketSocket>,
    closed: Arc<AtomicBool>,
    to_engine: mpsc::Sender<Frame>,
}

impl Receiver {
    fn run(self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while !self.closed.load(Ordering::Relaxed) {
            let (len, pkttype) = match self.socket.recv(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(iface = %self.iface, "error receiving frame: {:?}", e);
                    break;
                }
            };

            let frame = Frame::new(Arc::clone(&self.iface), direction(pkttype), BytesMut::from(&buf[..len]));
            match self.to_engine.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(iface = %self.iface, "frame queue full, dropping frame");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(iface = %self.iface, "engine hung up, stopping receiver");
                    break;
                }
            }
        }

        debug!(iface = %self.iface, "receiver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_frames_are_egress() {
        assert_eq!(direction(PACKET_OUTGOING), Direction::Egress);

        // Host, broadcast, multicast, other host and loopback.
        for pkttype in [0, 1, 2, 3, 5] {
            assert_eq!(direction(pkttype), Direction::Ingress);
        }
    }

    #[test]
    fn missing_interface() {
        let (tx, _rx) = mpsc::channel(1);
        let mut binder = RawBinder::new(tx);

        let err = binder.open("mangle-no-such-iface0").unwrap_err();
        assert!(matches!(err, LinkError::NoSuchInterface(name) if name == "mangle-no-such-iface0"));
    }
}
