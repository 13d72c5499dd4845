//! Family-parameterized network operations.
//!
//! Grounded on `original_source/vrrp_ipx.h`'s `struct vrrp_ipx` function
//! pointer table (`vrrp_ip4.c` / `vrrp_ip6.c`), rearchitected per
//! SPEC_FULL.md section 9 into a sealed `enum Family` chosen once at
//! configuration time rather than re-dispatched per packet.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::RawFd;

use crate::types::Version;

pub const VRRP_MULTICAST_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 18);
pub const VRRP_MULTICAST_V6: &str = "ff02::12";

pub const VRRP_PROTOCOL: u8 = 112;
pub const VRRP_TTL: u8 = 255;

/// Size of the VRRP header proper (version_type, vrid, priority, naddr,
/// the 2-byte v2/v3 union, checksum) per `vrrp_rfc.h`'s `struct vrrphdr`.
pub const VRRP_HDR_SIZE: usize = 8;

/// Address family a `VirtualRouter` is configured for. Chosen once at
/// startup and threaded through; no per-packet re-dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// IPvX metadata recovered from the receive path, independent of family.
#[derive(Debug, Clone, Copy)]
pub struct IpxHeader {
    pub len: usize,
    pub proto: u8,
    pub totlen: usize,
    pub ttl: u8,
}

impl Family {
    pub fn addr_len(self) -> usize {
        match self {
            Family::V4 => 4,
            Family::V6 => 16,
        }
    }

    /// Size of a VRRP advertisement for `naddr` virtual IPs. The v4 path
    /// always reserves 8 trailing bytes (v2 auth field), even under v3 —
    /// preserved byte-for-byte per SPEC_FULL.md section 9's first open
    /// question.
    pub fn adv_size(self, naddr: u8) -> usize {
        match self {
            Family::V4 => VRRP_HDR_SIZE + 4 * naddr as usize + 8,
            Family::V6 => VRRP_HDR_SIZE + 16 * naddr as usize,
        }
    }

    /// Join the VRRP multicast group on `fd`, bound to the instance's interface.
    pub fn join_multicast(self, fd: RawFd, if_index: u32, if_addr: IpAddr) -> Result<()> {
        unsafe {
            match self {
                Family::V4 => {
                    let IpAddr::V4(addr) = if_addr else {
                        return Err(Error::resource("join_multicast: expected IPv4 interface address"));
                    };
                    let mreq = libc::ip_mreqn {
                        imr_multiaddr: libc::in_addr {
                            s_addr: u32::from_be_bytes(VRRP_MULTICAST_V4.octets()),
                        },
                        imr_address: libc::in_addr {
                            s_addr: u32::from_be_bytes(addr.octets()),
                        },
                        imr_ifindex: if_index as i32,
                    };
                    setsockopt_raw(
                        fd,
                        libc::IPPROTO_IP,
                        libc::IP_ADD_MEMBERSHIP,
                        &mreq,
                    )
                }
                Family::V6 => {
                    let mcast: Ipv6Addr = VRRP_MULTICAST_V6.parse().unwrap();
                    let mreq = libc::ipv6_mreq {
                        ipv6mr_multiaddr: libc::in6_addr {
                            s6_addr: mcast.octets(),
                        },
                        ipv6mr_interface: if_index,
                    };
                    setsockopt_raw(
                        fd,
                        libc::IPPROTO_IPV6,
                        libc::IPV6_ADD_MEMBERSHIP,
                        &mreq,
                    )
                }
            }
        }
    }

    /// IPv6 needs ancillary data (packet info, hop limit) enabled on the
    /// receive socket because raw IPv6 sockets deliver no IP header at all.
    /// IPv4 is a no-op (the header is already in the buffer).
    pub fn set_sockopts(self, fd: RawFd) -> Result<()> {
        match self {
            Family::V4 => Ok(()),
            Family::V6 => unsafe {
                let on: libc::c_int = 1;
                setsockopt_raw(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO, &on)?;
                setsockopt_raw(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT, &on)
            },
        }
    }

    /// Compute the VRRP checksum over `msg` (header + addresses [+ auth]).
    /// v2/RFC3768 is a plain RFC1071 sum over the message only; v3/RFC5798
    /// and v6 fold in the IP pseudo-header.
    pub fn checksum(self, version: Version, msg: &[u8], saddr: IpAddr, daddr: IpAddr) -> u16 {
        match (self, version) {
            (Family::V4, Version::V2) => cksum(msg),
            (Family::V4, Version::V3) => {
                let (IpAddr::V4(s), IpAddr::V4(d)) = (saddr, daddr) else {
                    return 0;
                };
                let mut buf = Vec::with_capacity(12 + msg.len());
                buf.extend_from_slice(&s.octets());
                buf.extend_from_slice(&d.octets());
                buf.push(0);
                buf.push(VRRP_PROTOCOL);
                buf.extend_from_slice(&(msg.len() as u16).to_be_bytes());
                buf.extend_from_slice(msg);
                cksum(&buf)
            }
            (Family::V6, _) => {
                let (IpAddr::V6(s), IpAddr::V6(d)) = (saddr, daddr) else {
                    return 0;
                };
                let mut buf = Vec::with_capacity(40 + msg.len());
                buf.extend_from_slice(&s.octets());
                buf.extend_from_slice(&d.octets());
                buf.extend_from_slice(&(msg.len() as u32).to_be_bytes());
                buf.extend_from_slice(&[0, 0, 0]);
                buf.push(VRRP_PROTOCOL);
                buf.extend_from_slice(msg);
                cksum(&buf)
            }
        }
    }

    /// The well-known VRRP multicast group for this family.
    pub fn multicast_addr(self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(VRRP_MULTICAST_V4),
            Family::V6 => IpAddr::V6(VRRP_MULTICAST_V6.parse().unwrap()),
        }
    }

    pub fn addr_cmp(self, a: IpAddr, b: IpAddr) -> Ordering {
        match (a, b) {
            (IpAddr::V4(a), IpAddr::V4(b)) => u32::from(a).cmp(&u32::from(b)),
            (IpAddr::V6(a), IpAddr::V6(b)) => a.octets().cmp(&b.octets()),
            _ => Ordering::Equal,
        }
    }

    pub fn ntop(self, addr: IpAddr) -> String {
        addr.to_string()
    }

    pub fn pton(self, s: &str) -> Result<IpAddr> {
        s.parse()
            .map_err(|e| Error::protocol(format!("invalid address {s}: {e}")))
    }
}

/// RFC 1071 ones-complement checksum folding, as `common.h`'s `cksum()`.
pub fn cksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut iter = data.chunks_exact(2);
    for word in &mut iter {
        sum += u16::from_ne_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = *iter.remainder() {
        sum += last as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

unsafe fn setsockopt_raw<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, val: &T) -> Result<()> {
    let ret = libc::setsockopt(
        fd,
        level,
        name,
        val as *const T as *const libc::c_void,
        std::mem::size_of::<T>() as libc::socklen_t,
    );
    if ret < 0 {
        Err(Error::Io(std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}
