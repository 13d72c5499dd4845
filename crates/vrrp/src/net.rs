//! Wire-level send/receive sockets and the inbound validation chain.
//!
//! Grounded on `original_source/vrrp_net.c` (`vrrp_net_recv`'s ten-rule
//! validation, `vrrp_net_send` over `AF_PACKET`) and the teacher's
//! `socket.rs` (`socket2::Socket` construction, raw `libc::setsockopt`
//! calls, multicast join/leave on `Drop`).

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags, SockaddrIn6};
use nix::sys::uio::IoSliceMut;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::ipx::{Family, IpxHeader, VRRP_PROTOCOL, VRRP_TTL};
use crate::packet::VrrpMessage;
use crate::types::{InboundPacket, Version};

/// Outcome of receiving and validating one datagram, per the ten ordered
/// rules in `vrrp_net_recv`.
#[derive(Debug)]
pub enum RecvEvent {
    Ok(VrrpMessage, IpAddr),
    VridMismatch(u8),
    Invalid(String),
}

/// The receive (raw IPPROTO 112) and transmit (`AF_PACKET`) sockets for
/// one `VirtualRouter` instance.
pub struct NetSocket {
    family: Family,
    rx: Socket,
    tx_fd: RawFd,
    if_index: u32,
}

impl NetSocket {
    pub fn open(family: Family, ifname: &str, if_index: u32) -> Result<Self> {
        let domain = match family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        };
        let rx = Socket::new(domain, Type::RAW, Some(Protocol::from(VRRP_PROTOCOL as i32)))
            .map_err(Error::Io)?;
        rx.set_nonblocking(false).map_err(Error::Io)?;
        bind_to_device(rx.as_raw_fd(), ifname)?;
        set_ttl(family, rx.as_raw_fd())?;
        family.set_sockopts(rx.as_raw_fd())?;

        let tx_fd = open_packet_socket(if_index)?;

        Ok(Self {
            family,
            rx,
            tx_fd,
            if_index,
        })
    }

    pub fn join_multicast(&self, if_addr: IpAddr) -> Result<()> {
        self.family.join_multicast(self.rx.as_raw_fd(), self.if_index, if_addr)
    }

    /// The receive socket's file descriptor, for the event loop's `pselect` set.
    pub fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    /// Receive one datagram and run it through the ordered validation
    /// chain. `local` describes this router's own configuration, used to
    /// decide VRID match, checksum expectations, owner-rejects-inbound,
    /// and the v2-only auth/VIP-set/interval checks.
    pub fn receive(&self, local: &LocalParams) -> Result<RecvEvent> {
        let mut buf = [0u8; 2048];
        let (payload, hdr, saddr) = match self.family {
            Family::V4 => self.recv_v4(&mut buf)?,
            Family::V6 => self.recv_v6(&mut buf)?,
        };

        Ok(validate(self.family, local, &hdr, saddr, payload))
    }

    fn recv_v4<'a>(&self, buf: &'a mut [u8]) -> Result<(&'a [u8], IpxHeader, IpAddr)> {
        let (n, saddr) = recvfrom_raw(self.rx.as_raw_fd(), buf)?;
        let raw = &buf[..n];
        if raw.len() < 20 {
            return Err(Error::protocol("IPv4 datagram shorter than IP header"));
        }
        let ihl = (raw[0] & 0x0F) as usize * 4;
        if raw.len() < ihl {
            return Err(Error::protocol("IPv4 header length exceeds datagram"));
        }
        let ttl = raw[8];
        let proto = raw[9];
        let totlen = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let hdr = IpxHeader {
            len: ihl,
            proto,
            totlen,
            ttl,
        };
        Ok((&raw[ihl..], hdr, saddr))
    }

    fn recv_v6<'a>(&self, buf: &'a mut [u8]) -> Result<(&'a [u8], IpxHeader, IpAddr)> {
        let fd = self.rx.as_raw_fd();
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut iov = [IoSliceMut::new(buf)];
        let mut cmsg_buf = nix::cmsg_space!(libc::in6_pktinfo, libc::c_int);
        let msg = recvmsg::<SockaddrIn6>(
            borrowed.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::empty(),
        )
        .map_err(|e| Error::Io(io::Error::from(e)))?;

        let saddr = msg
            .address
            .map(|a: SockaddrIn6| IpAddr::V6(*a.ip()))
            .ok_or_else(|| Error::protocol("IPv6 recvmsg returned no source address"))?;

        let mut ttl = 0u8;
        for cmsg in msg.cmsgs().map_err(|e| Error::Io(io::Error::from(e)))? {
            if let ControlMessageOwned::Ipv6HopLimit(hl) = cmsg {
                ttl = hl as u8;
            }
        }

        let n = msg.bytes;
        // Raw IPv6 sockets never deliver the IP header; the protocol is
        // implicit in the socket's binding and must be asserted, not read.
        let hdr = IpxHeader {
            len: 0,
            proto: VRRP_PROTOCOL,
            totlen: n,
            ttl,
        };
        Ok((&buf[..n], hdr, saddr))
    }

    /// Transmit a fully-built link-layer frame (Ethernet header already
    /// present) out the bound interface.
    pub fn send_frame(&self, frame: &[u8]) -> Result<()> {
        let addr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: 0,
            sll_ifindex: self.if_index as i32,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 6,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::sendto(
                self.tx_fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            Err(Error::Io(io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }
}

impl Drop for NetSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.tx_fd);
        }
    }
}

/// Configuration facts the validation chain checks inbound packets against.
pub struct LocalParams {
    pub version: Version,
    pub vrid: u8,
    pub priority: u8,
    pub adv_interval: u16,
    pub auth_data: Option<[u8; 8]>,
    pub configured_vips: Vec<IpAddr>,
    pub daddr: IpAddr,
}

/// The ten ordered validation rules from `vrrp_net_recv`.
fn validate(
    family: Family,
    local: &LocalParams,
    hdr: &IpxHeader,
    saddr: IpAddr,
    payload: &[u8],
) -> RecvEvent {
    // 1. length bounds
    if payload.len() < 8 {
        return RecvEvent::Invalid("datagram shorter than VRRP header".into());
    }
    // 2. protocol field
    if hdr.proto != VRRP_PROTOCOL {
        return RecvEvent::Invalid(format!("unexpected IP protocol {}", hdr.proto));
    }
    // 3. version mismatch (folded into decode)
    let msg = match VrrpMessage::decode(payload, family, local.version) {
        Ok(m) => m,
        Err(e) => return RecvEvent::Invalid(e.to_string()),
    };
    // 4. TTL
    if hdr.ttl != VRRP_TTL {
        return RecvEvent::Invalid(format!("TTL {} != {}", hdr.ttl, VRRP_TTL));
    }
    // 5. VRID mismatch — a distinct event, not an error, since multiple
    // instances may share the multicast group on one interface.
    if msg.vrid != local.vrid {
        return RecvEvent::VridMismatch(msg.vrid);
    }
    // 6. checksum
    let mut zeroed = payload.to_vec();
    zeroed[6] = 0;
    zeroed[7] = 0;
    let expected = family.checksum(local.version, &zeroed, saddr, local.daddr);
    if expected != msg.checksum {
        return RecvEvent::Invalid("checksum mismatch".into());
    }
    // 7. the address owner accepts no inbound advertisements
    if local.priority == 255 {
        return RecvEvent::Invalid("address owner rejects inbound advertisements".into());
    }
    // 8. v2-only plaintext authentication
    if local.version == Version::V2 {
        if let Some(expected_auth) = &local.auth_data {
            if msg.auth_data.as_ref() != Some(expected_auth) {
                return RecvEvent::Invalid("authentication mismatch".into());
            }
        }
    }
    // 9. v2-only VIP set check, bypassed when the peer is the address owner
    if local.version == Version::V2 && msg.priority != 255 {
        let mut ours = local.configured_vips.clone();
        let mut theirs = msg.addrs.clone();
        ours.sort_by(|a, b| family.addr_cmp(*a, *b));
        theirs.sort_by(|a, b| family.addr_cmp(*a, *b));
        if ours != theirs {
            return RecvEvent::Invalid("advertised VIP set does not match configuration".into());
        }
    }
    // 10. v2-only advertisement interval check
    if local.version == Version::V2 {
        if let crate::packet::IntervalField::V2 { adv_int, .. } = msg.interval {
            if adv_int as u16 != local.adv_interval {
                return RecvEvent::Invalid("advertisement interval mismatch".into());
            }
        }
    }

    RecvEvent::Ok(msg, saddr)
}

fn bind_to_device(fd: RawFd, ifname: &str) -> Result<()> {
    let mut name_bytes = [0u8; libc::IFNAMSIZ];
    let bytes = ifname.as_bytes();
    if bytes.len() >= name_bytes.len() {
        return Err(Error::protocol("interface name too long"));
    }
    name_bytes[..bytes.len()].copy_from_slice(bytes);
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            name_bytes.as_ptr() as *const libc::c_void,
            name_bytes.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        Err(Error::Io(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn set_ttl(family: Family, fd: RawFd) -> Result<()> {
    let ttl: libc::c_int = VRRP_TTL as libc::c_int;
    let (level, name) = match family {
        Family::V4 => (libc::IPPROTO_IP, libc::IP_TTL),
        Family::V6 => (libc::IPPROTO_IPV6, libc::IPV6_UNICAST_HOPS),
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &ttl as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        Err(Error::Io(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn open_packet_socket(if_index: u32) -> Result<RawFd> {
    let eth_p_all_net: u16 = (libc::ETH_P_ALL as u16).to_be();
    let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, eth_p_all_net as i32) };
    if fd < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    let addr = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as u16,
        sll_protocol: eth_p_all_net,
        sll_ifindex: if_index as i32,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 6,
        sll_addr: [0; 8],
    };
    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(Error::Io(err));
    }
    Ok(fd)
}

fn recvfrom_raw(fd: RawFd, buf: &mut [u8]) -> Result<(usize, IpAddr)> {
    let mut from: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut fromlen = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut from as *mut _ as *mut libc::sockaddr,
            &mut fromlen,
        )
    };
    if n < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    let addr = Ipv4Addr::from(u32::from_be(from.sin_addr.s_addr));
    Ok((n as usize, IpAddr::V4(addr)))
}

pub fn resolve_if_index(ifname: &str) -> Result<u32> {
    let cname = std::ffi::CString::new(ifname)
        .map_err(|_| Error::protocol("interface name contains NUL byte"))?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 {
        Err(Error::Io(io::Error::last_os_error()))
    } else {
        Ok(idx)
    }
}

#[allow(dead_code)]
fn discard_unused_v6(_: Ipv6Addr) {}

impl InboundPacket {
    pub fn from_validated(saddr: IpAddr, daddr: IpAddr, ttl: u8, payload: Vec<u8>) -> Self {
        Self {
            saddr,
            daddr,
            ttl,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::IntervalField;

    fn local(version: Version) -> LocalParams {
        LocalParams {
            version,
            vrid: 1,
            priority: 100,
            adv_interval: 1,
            auth_data: None,
            configured_vips: vec!["192.168.1.1".parse().unwrap()],
            daddr: "224.0.0.18".parse().unwrap(),
        }
    }

    fn build_valid_v3() -> (Vec<u8>, IpAddr) {
        let msg = VrrpMessage {
            version: Version::V3,
            vrid: 1,
            priority: 100,
            addrs: vec!["192.168.1.1".parse().unwrap()],
            interval: IntervalField::V3 { max_adv_int: 100 },
            checksum: 0,
            auth_data: None,
        };
        let saddr: IpAddr = "10.0.0.1".parse().unwrap();
        let daddr: IpAddr = "224.0.0.18".parse().unwrap();
        (msg.encode_with_checksum(Family::V4, saddr, daddr), saddr)
    }

    #[test]
    fn valid_v3_packet_passes_the_chain() {
        let (payload, saddr) = build_valid_v3();
        let hdr = IpxHeader {
            len: 20,
            proto: VRRP_PROTOCOL,
            totlen: payload.len(),
            ttl: VRRP_TTL,
        };
        let outcome = validate(Family::V4, &local(Version::V3), &hdr, saddr, &payload);
        assert!(matches!(outcome, RecvEvent::Ok(_, _)));
    }

    #[test]
    fn vrid_mismatch_is_distinct_from_invalid() {
        let (payload, saddr) = build_valid_v3();
        let hdr = IpxHeader {
            len: 20,
            proto: VRRP_PROTOCOL,
            totlen: payload.len(),
            ttl: VRRP_TTL,
        };
        let mut other = local(Version::V3);
        other.vrid = 2;
        let outcome = validate(Family::V4, &other, &hdr, saddr, &payload);
        assert!(matches!(outcome, RecvEvent::VridMismatch(1)));
    }

    #[test]
    fn wrong_ttl_is_rejected() {
        let (payload, saddr) = build_valid_v3();
        let hdr = IpxHeader {
            len: 20,
            proto: VRRP_PROTOCOL,
            totlen: payload.len(),
            ttl: 64,
        };
        let outcome = validate(Family::V4, &local(Version::V3), &hdr, saddr, &payload);
        assert!(matches!(outcome, RecvEvent::Invalid(_)));
    }

    #[test]
    fn flipped_checksum_byte_is_rejected() {
        let (mut payload, saddr) = build_valid_v3();
        payload[6] ^= 0xFF;
        let hdr = IpxHeader {
            len: 20,
            proto: VRRP_PROTOCOL,
            totlen: payload.len(),
            ttl: VRRP_TTL,
        };
        let outcome = validate(Family::V4, &local(Version::V3), &hdr, saddr, &payload);
        assert!(matches!(outcome, RecvEvent::Invalid(_)));
    }

    #[test]
    fn owner_priority_rejects_all_inbound() {
        let (payload, saddr) = build_valid_v3();
        let hdr = IpxHeader {
            len: 20,
            proto: VRRP_PROTOCOL,
            totlen: payload.len(),
            ttl: VRRP_TTL,
        };
        let mut owner = local(Version::V3);
        owner.priority = 255;
        let outcome = validate(Family::V4, &owner, &hdr, saddr, &payload);
        assert!(matches!(outcome, RecvEvent::Invalid(_)));
    }
}
