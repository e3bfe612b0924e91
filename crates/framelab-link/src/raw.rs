use std::ffi::c_char;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use framelab_proto::{MacAddress, VlanTag, ETH_P_8021Q, MAC_ADDR_SIZE};
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::link::{check_mtu, Capture, Link};

// Not every libc target exports these, so they are spelled out here.
const PACKET_AUXDATA: libc::c_int = 8;
const TP_STATUS_VLAN_VALID: u32 = 1 << 4;
const TP_STATUS_VLAN_TPID_VALID: u32 = 1 << 6;
const SIOCETHTOOL: libc::c_ulong = 0x8946;
const ETHTOOL_STSO: u32 = 0x1f;
const ETHTOOL_SGSO: u32 = 0x24;
const ETHTOOL_SGRO: u32 = 0x2c;

/// Offloads that would hand us frames larger than the MTU.
const OFFLOADS: [(u32, &str); 3] = [
    (ETHTOOL_STSO, "disable TCP segmentation offload"),
    (ETHTOOL_SGSO, "disable generic segmentation offload"),
    (ETHTOOL_SGRO, "disable generic receive offload"),
];

/// `struct tpacket_auxdata` from `<linux/if_packet.h>`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
struct TpacketAuxdata {
    tp_status: u32,
    tp_len: u32,
    tp_snaplen: u32,
    tp_mac: u16,
    tp_net: u16,
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
}

/// `struct ethtool_value` from `<linux/ethtool.h>`.
#[repr(C)]
#[allow(dead_code)]
struct EthtoolValue {
    cmd: u32,
    data: u32,
}

/// Room for one `PACKET_AUXDATA` control message, 8-byte aligned.
type ControlBuffer = [u64; 8];

/// An `AF_PACKET` raw socket bound to one network interface.
///
/// Opening puts the interface into promiscuous mode and disables
/// segmentation offloads, which requires `CAP_NET_ADMIN`.
#[derive(Debug)]
pub struct RawLink {
    fd: OwnedFd,
    name: String,
    ifindex: i32,
    mac: MacAddress,
    mtu: usize,
}

impl RawLink {
    /// Open `name` for raw capture and injection.
    pub fn open(name: &str) -> Result<Self> {
        let ifr_name = ifreq_name(name)?;
        let open_err = |op: &'static str, source: io::Error| LinkError::Open {
            name: name.to_string(),
            op,
            source,
        };

        let protocol = (libc::ETH_P_ALL as u16).to_be() as libc::c_int;
        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                protocol,
            )
        };
        if raw < 0 {
            return Err(open_err("open packet socket", io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: `ifr_name` is NUL-terminated and outlives the call; the
        // length includes the terminator.
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                ifr_name.as_ptr().cast::<libc::c_void>(),
                (name.len() + 1) as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(open_err("bind to device", io::Error::last_os_error()));
        }

        let enable: libc::c_int = 1;
        // SAFETY: `enable` is a valid c_int for the duration of the call.
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_PACKET,
                PACKET_AUXDATA,
                (&enable as *const libc::c_int).cast::<libc::c_void>(),
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(open_err("enable PACKET_AUXDATA", io::Error::last_os_error()));
        }

        let mut ifr = new_ifreq(&ifr_name);
        ioctl(&fd, libc::SIOCGIFINDEX as libc::c_ulong, &mut ifr)
            .map_err(|e| open_err("look up interface index", e))?;
        // SAFETY: SIOCGIFINDEX filled the ifindex member of the union.
        let ifindex = unsafe { ifr.ifr_ifru.ifru_ifindex };

        let mut ifr = new_ifreq(&ifr_name);
        ioctl(&fd, libc::SIOCGIFHWADDR as libc::c_ulong, &mut ifr)
            .map_err(|e| open_err("read hardware address", e))?;
        // SAFETY: SIOCGIFHWADDR filled the hwaddr member of the union.
        let hwaddr = unsafe { ifr.ifr_ifru.ifru_hwaddr };
        let mut mac = [0u8; MAC_ADDR_SIZE];
        for (dst, src) in mac.iter_mut().zip(hwaddr.sa_data.iter()) {
            *dst = *src as u8;
        }
        let mac = MacAddress(mac);

        let mut ifr = new_ifreq(&ifr_name);
        ioctl(&fd, libc::SIOCGIFMTU as libc::c_ulong, &mut ifr)
            .map_err(|e| open_err("read MTU", e))?;
        // SAFETY: SIOCGIFMTU filled the mtu member of the union.
        let mtu = unsafe { ifr.ifr_ifru.ifru_mtu };
        let mtu = check_mtu(name, usize::try_from(mtu).unwrap_or(0))?;

        let mut ifr = new_ifreq(&ifr_name);
        ioctl(&fd, libc::SIOCGIFFLAGS as libc::c_ulong, &mut ifr)
            .map_err(|e| open_err("read interface flags", e))?;
        // SAFETY: SIOCGIFFLAGS filled the flags member; SIOCSIFFLAGS reads it.
        unsafe {
            ifr.ifr_ifru.ifru_flags |= libc::IFF_PROMISC as libc::c_short;
        }
        ioctl(&fd, libc::SIOCSIFFLAGS as libc::c_ulong, &mut ifr)
            .map_err(|e| open_err("enable promiscuous mode", e))?;

        for (cmd, op) in OFFLOADS {
            let mut value = EthtoolValue { cmd, data: 0 };
            let mut ifr = new_ifreq(&ifr_name);
            ifr.ifr_ifru.ifru_data = (&mut value as *mut EthtoolValue).cast::<c_char>();
            ioctl(&fd, SIOCETHTOOL, &mut ifr).map_err(|e| open_err(op, e))?;
        }

        info!(interface = name, ifindex, %mac, mtu, "opened raw link");
        Ok(Self {
            fd,
            name: name.to_string(),
            ifindex,
            mac,
            mtu,
        })
    }

    /// Kernel interface index.
    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }
}

impl AsRawFd for RawLink {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Link for RawLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> MacAddress {
        self.mac
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<Capture> {
        // SAFETY: all-zero is a valid sockaddr_ll and msghdr.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut control: ControlBuffer = [0; 8];
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast::<libc::c_void>(),
            iov_len: buf.len(),
        };
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut addr as *mut libc::sockaddr_ll).cast::<libc::c_void>();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast::<libc::c_void>();
        msg.msg_controllen = mem::size_of::<ControlBuffer>() as _;

        // SAFETY: every pointer in `msg` refers to a live local or to `buf`,
        // with lengths matching their allocations.
        let n = unsafe { libc::recvmsg(self.fd.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if addr.sll_ifindex != self.ifindex {
            return Ok(Capture::Foreign {
                ifindex: addr.sll_ifindex,
            });
        }

        // SAFETY: `msg` was filled in by recvmsg and its control buffer is
        // still alive.
        let vlan = unsafe { auxdata(&msg) }.and_then(|aux| vlan_from_aux(&aux));
        Ok(Capture::Frame {
            len: n as usize,
            vlan,
        })
    }

    fn send_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        // SAFETY: all-zero is a valid sockaddr_ll.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = MAC_ADDR_SIZE as u8;
        let dst_len = frame.len().min(MAC_ADDR_SIZE);
        addr.sll_addr[..dst_len].copy_from_slice(&frame[..dst_len]);

        // SAFETY: `frame` and `addr` are valid for the lengths passed.
        let n = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                frame.as_ptr().cast::<libc::c_void>(),
                frame.len(),
                0,
                (&addr as *const libc::sockaddr_ll).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!(interface = %self.name, len = n, "sent frame");
        Ok(n as usize)
    }
}

/// Encode `name` for `ifreq.ifr_name`.
fn ifreq_name(name: &str) -> Result<[c_char; libc::IFNAMSIZ]> {
    if name.is_empty() || name.bytes().any(|b| b == 0) {
        return Err(LinkError::InvalidName {
            name: name.to_string(),
        });
    }
    let max = libc::IFNAMSIZ - 1;
    if name.len() > max {
        return Err(LinkError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
            max,
        });
    }
    let mut out = [0 as c_char; libc::IFNAMSIZ];
    for (dst, src) in out.iter_mut().zip(name.bytes()) {
        *dst = src as c_char;
    }
    Ok(out)
}

fn new_ifreq(name: &[c_char; libc::IFNAMSIZ]) -> libc::ifreq {
    // SAFETY: all-zero is a valid ifreq.
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    ifr.ifr_name = *name;
    ifr
}

fn ioctl(fd: &OwnedFd, request: libc::c_ulong, ifr: &mut libc::ifreq) -> io::Result<()> {
    // SAFETY: `ifr` is a valid, writable ifreq for every request used here.
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, ifr as *mut libc::ifreq) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Find the `PACKET_AUXDATA` control message in a received `msghdr`.
///
/// # Safety
///
/// `msg` must have been filled in by `recvmsg` and its control buffer must
/// still be valid.
unsafe fn auxdata(msg: &libc::msghdr) -> Option<TpacketAuxdata> {
    let want = libc::CMSG_LEN(mem::size_of::<TpacketAuxdata>() as libc::c_uint) as usize;
    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        let hdr = &*cmsg;
        if hdr.cmsg_level == libc::SOL_PACKET
            && hdr.cmsg_type == PACKET_AUXDATA
            && hdr.cmsg_len as usize >= want
        {
            return Some(ptr::read_unaligned(
                libc::CMSG_DATA(cmsg).cast::<TpacketAuxdata>(),
            ));
        }
        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }
    None
}

/// The VLAN tag described by auxiliary data, if the kernel reported one.
fn vlan_from_aux(aux: &TpacketAuxdata) -> Option<VlanTag> {
    if aux.tp_vlan_tci == 0 && aux.tp_status & TP_STATUS_VLAN_VALID == 0 {
        return None;
    }
    let tpid = if aux.tp_vlan_tpid != 0 || aux.tp_status & TP_STATUS_VLAN_TPID_VALID != 0 {
        aux.tp_vlan_tpid
    } else {
        ETH_P_8021Q
    };
    Some(VlanTag {
        tpid,
        tci: aux.tp_vlan_tci,
    })
}
