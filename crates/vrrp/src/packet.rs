//! VRRP message codec and the link-layer frames built around it.
//!
//! Header layout grounded on `original_source/vrrp_rfc.h`'s `struct
//! vrrphdr` (the v2/v3 union in the third 16-bit word); Ethernet/ARP/NA
//! frame templates grounded on `vrrp_adv.c`, `vrrp_arp.c`, `vrrp_na.c`.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version| Type  |    VRID       |   Priority    |  Count IPvX   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | v2: Auth Type |  Adver Int    |            Checksum           |
//! | v3: (rsvd)    |     Max Adver Int    |      Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       IPvX Address(es)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | v2 only: Authentication Data (8 bytes)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};
use crate::ipx::{cksum, Family, VRRP_PROTOCOL, VRRP_TTL};
use crate::types::Version;

const VRRP_TYPE_ADVERTISEMENT: u8 = 1;

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_ARP: u16 = 0x0806;
pub const ETH_HDR_LEN: usize = 14;

/// The v2/v3 union occupying the VRRP header's third 16-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalField {
    V2 { auth_type: u8, adv_int: u8 },
    V3 { max_adv_int: u16 },
}

/// A decoded or about-to-be-encoded VRRP advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrrpMessage {
    pub version: Version,
    pub vrid: u8,
    pub priority: u8,
    pub addrs: Vec<IpAddr>,
    pub interval: IntervalField,
    pub checksum: u16,
    /// v2's 8-byte plaintext authentication trailer. `None` encodes as zeros.
    pub auth_data: Option<[u8; 8]>,
}

impl VrrpMessage {
    /// Serialize with the checksum field left as stored on `self` — callers
    /// that need a fresh checksum should compute it via `Family::checksum`
    /// over this output (with the checksum field zeroed) and patch bytes
    /// `[6..8]` before transmission.
    pub fn encode(&self, family: Family) -> Vec<u8> {
        let mut buf = Vec::with_capacity(family.adv_size(self.addrs.len() as u8));
        let version_num = match self.version {
            Version::V2 => 2u8,
            Version::V3 => 3u8,
        };
        buf.push((version_num << 4) | VRRP_TYPE_ADVERTISEMENT);
        buf.push(self.vrid);
        buf.push(self.priority);
        buf.push(self.addrs.len() as u8);

        match self.interval {
            IntervalField::V2 { auth_type, adv_int } => {
                buf.push(auth_type);
                buf.push(adv_int);
            }
            IntervalField::V3 { max_adv_int } => {
                buf.extend_from_slice(&(max_adv_int & 0x0FFF).to_be_bytes());
            }
        }

        buf.extend_from_slice(&self.checksum.to_be_bytes());

        for addr in &self.addrs {
            match addr {
                IpAddr::V4(a) => buf.extend_from_slice(&a.octets()),
                IpAddr::V6(a) => buf.extend_from_slice(&a.octets()),
            }
        }

        if family == Family::V4 {
            buf.extend_from_slice(&self.auth_data.unwrap_or([0u8; 8]));
        }

        buf
    }

    /// Parse a message known to be `family`/`version` already (the
    /// instance's configuration, not re-derived from packet length).
    pub fn decode(data: &[u8], family: Family, version: Version) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::protocol("VRRP message shorter than header"));
        }

        let version_type = data[0];
        let pkt_version = version_type >> 4;
        let pkt_type = version_type & 0x0F;

        let expected_version = match version {
            Version::V2 => 2,
            Version::V3 => 3,
        };
        if pkt_version != expected_version {
            return Err(Error::protocol(format!(
                "version mismatch: expected {expected_version}, got {pkt_version}"
            )));
        }
        if pkt_type != VRRP_TYPE_ADVERTISEMENT {
            return Err(Error::protocol("unsupported VRRP packet type"));
        }

        let vrid = data[1];
        let priority = data[2];
        let naddr = data[3];

        let interval = match version {
            Version::V2 => IntervalField::V2 {
                auth_type: data[4],
                adv_int: data[5],
            },
            Version::V3 => IntervalField::V3 {
                max_adv_int: u16::from_be_bytes([data[4] & 0x0F, data[5]]),
            },
        };
        let checksum = u16::from_be_bytes([data[6], data[7]]);

        let expected_len = family.adv_size(naddr);
        if data.len() != expected_len {
            return Err(Error::protocol(format!(
                "length {} does not match expected {} for {} addresses",
                data.len(),
                expected_len,
                naddr
            )));
        }

        let mut offset = 8;
        let mut addrs = Vec::with_capacity(naddr as usize);
        match family {
            Family::V4 => {
                for _ in 0..naddr {
                    let a = Ipv4Addr::new(
                        data[offset],
                        data[offset + 1],
                        data[offset + 2],
                        data[offset + 3],
                    );
                    addrs.push(IpAddr::V4(a));
                    offset += 4;
                }
            }
            Family::V6 => {
                for _ in 0..naddr {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&data[offset..offset + 16]);
                    addrs.push(IpAddr::V6(Ipv6Addr::from(octets)));
                    offset += 16;
                }
            }
        }

        let auth_data = if family == Family::V4 {
            let mut trailer = [0u8; 8];
            trailer.copy_from_slice(&data[offset..offset + 8]);
            Some(trailer)
        } else {
            None
        };

        Ok(Self {
            version,
            vrid,
            priority,
            addrs,
            interval,
            checksum,
            auth_data,
        })
    }

    /// Encode with the checksum field computed and patched in.
    pub fn encode_with_checksum(&self, family: Family, saddr: IpAddr, daddr: IpAddr) -> Vec<u8> {
        let mut zeroed = self.clone();
        zeroed.checksum = 0;
        let mut buf = zeroed.encode(family);
        let sum = family.checksum(self.version, &buf, saddr, daddr);
        buf[6..8].copy_from_slice(&sum.to_be_bytes());
        buf
    }

    /// Build the same message with `priority` substituted, re-checksummed —
    /// the shutdown/graceful-withdrawal path's priority-0 advertisement,
    /// sent without mutating the router's own stored priority.
    pub fn encode_with_priority(
        &self,
        family: Family,
        priority: u8,
        saddr: IpAddr,
        daddr: IpAddr,
    ) -> Vec<u8> {
        let mut overridden = self.clone();
        overridden.priority = priority;
        overridden.encode_with_checksum(family, saddr, daddr)
    }
}

/// This router's Ethernet source address is always `00:00:5E:00:01:VRID`
/// (RFC 5798 section 7.3), regardless of family or message type.
pub fn eth_src_mac(vrid: u8) -> [u8; 6] {
    [0x00, 0x00, 0x5E, 0x00, 0x01, vrid]
}

pub fn eth_dst_mac_advertisement(family: Family) -> [u8; 6] {
    match family {
        Family::V4 => [0x01, 0x00, 0x5E, 0x00, 0x00, 0x12],
        Family::V6 => [0x33, 0x33, 0x00, 0x00, 0x00, 0x12],
    }
}

pub const ETH_DST_BROADCAST: [u8; 6] = [0xFF; 6];
pub const ETH_DST_NA_ALL_NODES: [u8; 6] = [0x33, 0x33, 0x00, 0x00, 0x00, 0x01];

pub fn build_eth_header(dst: [u8; 6], src: [u8; 6], ethertype: u16) -> [u8; ETH_HDR_LEN] {
    let mut hdr = [0u8; ETH_HDR_LEN];
    hdr[0..6].copy_from_slice(&dst);
    hdr[6..12].copy_from_slice(&src);
    hdr[12..14].copy_from_slice(&ethertype.to_be_bytes());
    hdr
}

/// Gratuitous ARP request for `vip`, announcing this router's ownership —
/// grounded on `vrrp_arp.c`'s `arphdr_eth` template.
pub fn build_gratuitous_arp(vrid: u8, vip: Ipv4Addr) -> Vec<u8> {
    let src_mac = eth_src_mac(vrid);
    let mut frame = Vec::with_capacity(ETH_HDR_LEN + 28);
    frame.extend_from_slice(&build_eth_header(ETH_DST_BROADCAST, src_mac, ETH_P_ARP));
    frame.extend_from_slice(&1u16.to_be_bytes()); // hardware type: Ethernet
    frame.extend_from_slice(&ETH_P_IP.to_be_bytes()); // protocol type
    frame.push(6); // hardware address length
    frame.push(4); // protocol address length
    frame.extend_from_slice(&1u16.to_be_bytes()); // opcode: request
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&vip.octets());
    frame.extend_from_slice(&[0u8; 6]); // target hardware address unknown
    frame.extend_from_slice(&vip.octets());
    frame
}

/// Unsolicited Neighbor Advertisement for `vip`, R=1 (router) O=1
/// (override) S=0 (unsolicited), destined to the all-nodes multicast
/// address — grounded on `vrrp_na.c`.
pub fn build_neighbor_advertisement(vrid: u8, vip: Ipv6Addr) -> Vec<u8> {
    let src_mac = eth_src_mac(vrid);
    let dst_ip: Ipv6Addr = "ff02::1".parse().expect("valid all-nodes address");

    let mut icmp = Vec::with_capacity(32);
    icmp.push(136); // ICMPv6 type: Neighbor Advertisement
    icmp.push(0); // code
    icmp.extend_from_slice(&[0, 0]); // checksum placeholder
    icmp.extend_from_slice(&0x6000_0000u32.to_be_bytes()); // R=1 O=1 S=0
    icmp.extend_from_slice(&vip.octets());
    icmp.push(2); // option type: target link-layer address
    icmp.push(1); // option length, in units of 8 bytes
    icmp.extend_from_slice(&src_mac);

    let sum = icmp6_pseudo_checksum(vip, dst_ip, &icmp);
    icmp[2..4].copy_from_slice(&sum.to_be_bytes());

    let mut ip6 = Vec::with_capacity(40);
    ip6.extend_from_slice(&0x6000_0000u32.to_be_bytes()); // version 6, no traffic class/flow label
    ip6.extend_from_slice(&(icmp.len() as u16).to_be_bytes());
    ip6.push(58); // next header: ICMPv6
    ip6.push(255); // hop limit
    ip6.extend_from_slice(&vip.octets());
    ip6.extend_from_slice(&dst_ip.octets());

    let mut frame = Vec::with_capacity(ETH_HDR_LEN + ip6.len() + icmp.len());
    frame.extend_from_slice(&build_eth_header(ETH_DST_NA_ALL_NODES, src_mac, ETH_P_IPV6));
    frame.extend_from_slice(&ip6);
    frame.extend_from_slice(&icmp);
    frame
}

/// Build the full Ethernet + IP + VRRP advertisement frame, ready for
/// `NetSocket::send_frame` — grounded on `vrrp_adv.c`'s prebuilt frame,
/// which carries its own IP header rather than relying on the kernel to
/// construct one, so TTL/protocol/destination stay exact.
pub fn build_advertisement_frame(
    family: Family,
    vrid: u8,
    saddr: IpAddr,
    daddr: IpAddr,
    vrrp_payload: &[u8],
) -> Vec<u8> {
    let src_mac = eth_src_mac(vrid);
    let dst_mac = eth_dst_mac_advertisement(family);
    match family {
        Family::V4 => {
            let mut frame = Vec::with_capacity(ETH_HDR_LEN + 20 + vrrp_payload.len());
            frame.extend_from_slice(&build_eth_header(dst_mac, src_mac, ETH_P_IP));
            frame.extend_from_slice(&build_ipv4_header(saddr, daddr, vrrp_payload.len()));
            frame.extend_from_slice(vrrp_payload);
            frame
        }
        Family::V6 => {
            let mut frame = Vec::with_capacity(ETH_HDR_LEN + 40 + vrrp_payload.len());
            frame.extend_from_slice(&build_eth_header(dst_mac, src_mac, ETH_P_IPV6));
            frame.extend_from_slice(&build_ipv6_header(saddr, daddr, vrrp_payload.len()));
            frame.extend_from_slice(vrrp_payload);
            frame
        }
    }
}

fn build_ipv4_header(saddr: IpAddr, daddr: IpAddr, payload_len: usize) -> [u8; 20] {
    let IpAddr::V4(s) = saddr else {
        panic!("build_ipv4_header requires an IPv4 source address");
    };
    let IpAddr::V4(d) = daddr else {
        panic!("build_ipv4_header requires an IPv4 destination address");
    };
    let mut hdr = [0u8; 20];
    hdr[0] = 0x45; // version 4, IHL 5
    hdr[1] = 0xC0; // DSCP: internetwork control, per RFC 5798 section 5.1.5
    let total_len = (20 + payload_len) as u16;
    hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
    hdr[8] = VRRP_TTL;
    hdr[9] = VRRP_PROTOCOL;
    hdr[12..16].copy_from_slice(&s.octets());
    hdr[16..20].copy_from_slice(&d.octets());
    let checksum = cksum(&hdr);
    hdr[10..12].copy_from_slice(&checksum.to_be_bytes());
    hdr
}

fn build_ipv6_header(saddr: IpAddr, daddr: IpAddr, payload_len: usize) -> [u8; 40] {
    let IpAddr::V6(s) = saddr else {
        panic!("build_ipv6_header requires an IPv6 source address");
    };
    let IpAddr::V6(d) = daddr else {
        panic!("build_ipv6_header requires an IPv6 destination address");
    };
    let mut hdr = [0u8; 40];
    hdr[0..4].copy_from_slice(&0x6000_0000u32.to_be_bytes());
    hdr[4..6].copy_from_slice(&(payload_len as u16).to_be_bytes());
    hdr[6] = VRRP_PROTOCOL;
    hdr[7] = VRRP_TTL;
    hdr[8..24].copy_from_slice(&s.octets());
    hdr[24..40].copy_from_slice(&d.octets());
    hdr
}

fn icmp6_pseudo_checksum(src: Ipv6Addr, dst: Ipv6Addr, msg: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(40 + msg.len());
    buf.extend_from_slice(&src.octets());
    buf.extend_from_slice(&dst.octets());
    buf.extend_from_slice(&(msg.len() as u32).to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0]);
    buf.push(58);
    buf.extend_from_slice(msg);
    cksum(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v3(addrs: Vec<IpAddr>) -> VrrpMessage {
        VrrpMessage {
            version: Version::V3,
            vrid: 1,
            priority: 100,
            addrs,
            interval: IntervalField::V3 { max_adv_int: 100 },
            checksum: 0,
            auth_data: None,
        }
    }

    #[test]
    fn v3_round_trips_through_encode_decode() {
        let msg = sample_v3(vec!["192.168.1.1".parse().unwrap(), "192.168.1.2".parse().unwrap()]);
        let saddr = "10.0.0.1".parse().unwrap();
        let daddr = "224.0.0.18".parse().unwrap();
        let bytes = msg.encode_with_checksum(Family::V4, saddr, daddr);
        let decoded = VrrpMessage::decode(&bytes, Family::V4, Version::V3).unwrap();
        assert_eq!(decoded.vrid, msg.vrid);
        assert_eq!(decoded.priority, msg.priority);
        assert_eq!(decoded.addrs, msg.addrs);
        assert_eq!(decoded.interval, msg.interval);
    }

    #[test]
    fn v2_carries_auth_trailer() {
        let mut msg = sample_v3(vec!["192.168.1.1".parse().unwrap()]);
        msg.version = Version::V2;
        msg.interval = IntervalField::V2 { auth_type: 0, adv_int: 1 };
        msg.auth_data = Some(*b"password");
        let saddr = "10.0.0.1".parse().unwrap();
        let daddr = "224.0.0.18".parse().unwrap();
        let bytes = msg.encode_with_checksum(Family::V4, saddr, daddr);
        assert_eq!(bytes.len(), Family::V4.adv_size(1));
        let decoded = VrrpMessage::decode(&bytes, Family::V4, Version::V2).unwrap();
        assert_eq!(decoded.auth_data, msg.auth_data);
    }

    #[test]
    fn decode_rejects_version_mismatch() {
        let msg = sample_v3(vec!["192.168.1.1".parse().unwrap()]);
        let bytes = msg.encode(Family::V4);
        assert!(VrrpMessage::decode(&bytes, Family::V4, Version::V2).is_err());
    }

    #[test]
    fn priority_override_does_not_mutate_original() {
        let msg = sample_v3(vec!["192.168.1.1".parse().unwrap()]);
        let saddr = "10.0.0.1".parse().unwrap();
        let daddr = "224.0.0.18".parse().unwrap();
        let shutdown = msg.encode_with_priority(Family::V4, 0, saddr, daddr);
        assert_eq!(shutdown[2], 0);
        assert_eq!(msg.priority, 100);
    }

    #[test]
    fn eth_src_mac_encodes_vrid() {
        assert_eq!(eth_src_mac(7), [0x00, 0x00, 0x5E, 0x00, 0x01, 7]);
    }

    #[test]
    fn gratuitous_arp_has_expected_length() {
        let vip: Ipv4Addr = "192.168.1.1".parse().unwrap();
        let frame = build_gratuitous_arp(1, vip);
        assert_eq!(frame.len(), ETH_HDR_LEN + 28);
    }

    #[test]
    fn neighbor_advertisement_sets_router_override_flags() {
        let vip: Ipv6Addr = "fe80::1".parse().unwrap();
        let frame = build_neighbor_advertisement(1, vip);
        let icmp_start = ETH_HDR_LEN + 40;
        assert_eq!(frame[icmp_start], 136);
        assert_eq!(frame[icmp_start + 4] & 0xC0, 0xC0);
    }

    #[test]
    fn advertisement_frame_v4_carries_ttl_255_and_protocol_112() {
        let msg = sample_v3(vec!["192.168.1.1".parse().unwrap()]);
        let saddr = "10.0.0.1".parse().unwrap();
        let daddr = "224.0.0.18".parse().unwrap();
        let payload = msg.encode_with_checksum(Family::V4, saddr, daddr);
        let frame = build_advertisement_frame(Family::V4, 1, saddr, daddr, &payload);
        assert_eq!(frame.len(), ETH_HDR_LEN + 20 + payload.len());
        assert_eq!(frame[ETH_HDR_LEN + 8], VRRP_TTL);
        assert_eq!(frame[ETH_HDR_LEN + 9], VRRP_PROTOCOL);
        assert_eq!(&frame[ETH_HDR_LEN + 20..], payload.as_slice());
    }

    #[test]
    fn advertisement_frame_v6_carries_hop_limit_255_and_next_header_112() {
        let mut msg = sample_v3(vec!["fe80::1".parse().unwrap()]);
        msg.auth_data = None;
        let saddr: IpAddr = "fe80::2".parse().unwrap();
        let daddr: IpAddr = "ff02::12".parse().unwrap();
        let payload = msg.encode_with_checksum(Family::V6, saddr, daddr);
        let frame = build_advertisement_frame(Family::V6, 1, saddr, daddr, &payload);
        assert_eq!(frame.len(), ETH_HDR_LEN + 40 + payload.len());
        assert_eq!(frame[ETH_HDR_LEN + 6], VRRP_PROTOCOL);
        assert_eq!(frame[ETH_HDR_LEN + 7], VRRP_TTL);
    }
}
