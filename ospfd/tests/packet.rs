use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use maplit::btreeset;
use ospfd::packet::error::DecodeError;
use ospfd::packet::lsa::{
    Lsa, LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaKey, LsaNetwork,
    LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaSummary,
    LsaType,
};
use ospfd::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketType,
};

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x01, 0x00, 0x30, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0xf6, 0x94, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x0a, 0x02, 0x01, 0x00,
            0x00, 0x00, 0x28, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
            },
            network_mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
            hello_interval: 10,
            options: Options::E,
            priority: 1,
            dead_interval: 40,
            dr: None,
            bdr: None,
            neighbors: btreeset![Ipv4Addr::from_str("2.2.2.2").unwrap()],
        }),
    )
});

static ROUTER_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x01, 0x80, 0x00, 0x00, 0x01, 0xd6, 0x69, 0x00, 0x24, 0x00, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x03,
            0x00, 0x00, 0x01,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::from_str("1.1.1.1").unwrap(),
            Ipv4Addr::from_str("1.1.1.1").unwrap(),
            0x80000001,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::empty(),
                links: vec![LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    Ipv4Addr::from_str("10.0.0.0").unwrap(),
                    Ipv4Addr::from_str("255.255.255.0").unwrap(),
                    1,
                )],
            }),
        ),
    )
});

static NETWORK_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x02, 0x0a, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x01, 0x35, 0x05, 0x00, 0x20, 0xff, 0xff,
            0xff, 0x00, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::from_str("10.0.0.2").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000001,
            LsaBody::Network(LsaNetwork {
                mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                attached_rtrs: btreeset![
                    Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    Ipv4Addr::from_str("2.2.2.2").unwrap(),
                ],
            }),
        ),
    )
});

static SUMMARY_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x03, 0xc0, 0xa8, 0x01, 0x00, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x01, 0xd6, 0x0a, 0x00, 0x1c, 0xff, 0xff,
            0xff, 0x00, 0x00, 0x00, 0x00, 0x0a,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::from_str("192.168.1.0").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000001,
            LsaBody::SummaryNetwork(LsaSummary {
                mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                metric: 10,
            }),
        ),
    )
});

static AS_EXTERNAL_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x02, 0x05, 0xac, 0x10, 0x00, 0x00, 0x03, 0x03, 0x03,
            0x03, 0x80, 0x00, 0x00, 0x01, 0xcb, 0x2a, 0x00, 0x24, 0xff, 0xff,
            0x00, 0x00, 0x80, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
        ],
        Lsa::new(
            1,
            Options::E,
            Ipv4Addr::from_str("172.16.0.0").unwrap(),
            Ipv4Addr::from_str("3.3.3.3").unwrap(),
            0x80000001,
            LsaBody::AsExternal(LsaAsExternal {
                mask: Ipv4Addr::from_str("255.255.0.0").unwrap(),
                flags: LsaAsExternalFlags::E,
                metric: 20,
                fwd_addr: None,
                tag: 0,
            }),
        ),
    )
});

static DBDESC1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x02, 0x00, 0x34, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x93, 0x67, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x05, 0xdc, 0x02, 0x07, 0x00, 0x00, 0x03, 0xe8, 0x00,
            0x01, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x80, 0x00, 0x00, 0x01, 0xd6, 0x69, 0x00, 0x24,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
            },
            mtu: 1500,
            options: Options::E,
            dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
            dd_seq_no: 1000,
            lsa_hdrs: vec![ROUTER_LSA1.1.hdr],
        }),
    )
});

static LSREQUEST1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x03, 0x00, 0x24, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x00, 0xf5, 0xcf, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x01, 0x01, 0x01,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
            },
            entries: vec![LsaKey {
                lsa_type: LsaType(1),
                adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                lsa_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
            }],
        }),
    )
});

static LSUPDATE1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x04, 0x00, 0x40, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x93, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x02, 0x01, 0x01,
            0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x01,
            0xd6, 0x69, 0x00, 0x24, 0x00, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00,
            0x00, 0xff, 0xff, 0xff, 0x00, 0x03, 0x00, 0x00, 0x01,
        ],
        Packet::LsUpdate(LsUpdate {
            hdr: PacketHdr {
                pkt_type: PacketType::LsUpdate,
                router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
            },
            lsas: vec![ROUTER_LSA1.1.clone()],
        }),
    )
});

static LSACK1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x05, 0x00, 0x2c, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x00, 0x9d, 0x35, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x01, 0xd6, 0x69, 0x00, 0x24,
        ],
        Packet::LsAck(LsAck {
            hdr: PacketHdr {
                pkt_type: PacketType::LsAck,
                router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
            },
            lsa_hdrs: vec![ROUTER_LSA1.1.hdr],
        }),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref hello) = *HELLO1;
    test_encode_packet(bytes, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref hello) = *HELLO1;
    test_decode_packet(bytes, hello);
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref dbdesc) = *DBDESC1;
    test_encode_packet(bytes, dbdesc);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref dbdesc) = *DBDESC1;
    test_decode_packet(bytes, dbdesc);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref request) = *LSREQUEST1;
    test_encode_packet(bytes, request);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref request) = *LSREQUEST1;
    test_decode_packet(bytes, request);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref lsupdate) = *LSUPDATE1;
    test_encode_packet(bytes, lsupdate);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref lsupdate) = *LSUPDATE1;
    test_decode_packet(bytes, lsupdate);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref lsack) = *LSACK1;
    test_encode_packet(bytes, lsack);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref lsack) = *LSACK1;
    test_decode_packet(bytes, lsack);
}

#[test]
fn test_encode_router_lsa1() {
    let (ref bytes, ref lsa) = *ROUTER_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_router_lsa1() {
    let (ref bytes, ref lsa) = *ROUTER_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_network_lsa1() {
    let (ref bytes, ref lsa) = *NETWORK_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_network_lsa1() {
    let (ref bytes, ref lsa) = *NETWORK_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_summary_lsa1() {
    let (ref bytes, ref lsa) = *SUMMARY_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_summary_lsa1() {
    let (ref bytes, ref lsa) = *SUMMARY_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_as_external_lsa1() {
    let (ref bytes, ref lsa) = *AS_EXTERNAL_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_as_external_lsa1() {
    let (ref bytes, ref lsa) = *AS_EXTERNAL_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_decode_hello_bad_checksum() {
    // Corrupt a body byte and make sure the checksum validation rejects the
    // packet.
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[30] ^= 0xff;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::InvalidChecksum)
    ));
}

#[test]
fn test_decode_bad_version() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[0] = 3;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::InvalidVersion(3))
    ));
}

#[test]
fn test_decode_truncated_packet() {
    let (ref bytes, _) = *HELLO1;
    let mut buf = Bytes::copy_from_slice(&bytes[..20]);
    assert!(matches!(
        Packet::decode(&mut buf),
        Err(DecodeError::IncompletePacket)
    ));
}

#[test]
fn test_lsa_checksum_validation() {
    // The Fletcher checksum of an encoded LSA verifies to zero, and fails
    // once any covered byte is perturbed.
    let (ref bytes, _) = *ROUTER_LSA1;
    let mut buf = Bytes::copy_from_slice(bytes);
    let lsa = Lsa::decode(&mut buf).unwrap();
    assert!(lsa.validate().is_ok());

    let mut bytes = bytes.clone();
    bytes[21] ^= 0x01;
    let mut buf = Bytes::copy_from_slice(&bytes);
    let lsa = Lsa::decode(&mut buf).unwrap();
    assert!(lsa.validate().is_err());
}
