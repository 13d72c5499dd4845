//! End-to-end election scenarios driven purely through the public API:
//! the state machine, the packet codec, and the net validation chain.
//! No real sockets are opened here — these exercise the same decision
//! logic `uvrrpd::daemon`'s event loop drives, without depending on
//! root privileges or a live interface.

use std::net::IpAddr;
use std::time::Duration;

use vrrp::ipx::Family;
use vrrp::packet::{IntervalField, VrrpMessage};
use vrrp::state_machine::{Action, Event, HookState, PeerAdvertisement};
use vrrp::types::{NetContext, State, Version, Vip, VirtualRouter};

fn router(vrid: u8, priority: u8, primary_addr: &str, preempt: bool) -> VirtualRouter {
    VirtualRouter {
        vrid,
        version: Version::V3,
        family: Family::V4,
        priority,
        vips: vec![Vip::host("10.0.0.1".parse().unwrap())],
        preempt,
        auth_data: None,
        adv_interval: 100,
        master_adv_interval: None,
        net: NetContext {
            ifname: "eth0".into(),
            if_index: 1,
            if_mac: [0; 6],
            primary_addr: primary_addr.parse().unwrap(),
        },
        state: State::Init,
    }
}

fn peer(priority: u8, source: &str, max_adv_int: Option<u16>) -> PeerAdvertisement {
    PeerAdvertisement {
        priority,
        source: source.parse().unwrap(),
        max_adv_int,
    }
}

/// Scenario 1: master election on startup. The priority-150 VR becomes
/// Master immediately on `enter_init`; the priority-100 VR becomes
/// Backup and only takes over once its Master-Down interval lapses or
/// it hears a lower/priority-0 peer.
#[test]
fn master_election_on_startup() {
    let mut high = router(7, 150, "10.0.0.2", true);
    let mut low = router(7, 100, "10.0.0.3", true);

    let high_actions = high.enter_init();
    let low_actions = low.enter_init();

    assert_eq!(high.state, State::Master);
    assert!(high_actions.contains(&Action::SendTopologyBurst));
    assert!(high_actions.contains(&Action::InvokeHook(HookState::Master)));

    assert_eq!(low.state, State::Backup);
    assert_eq!(low_actions, vec![Action::ArmMasterDownTimer]);

    // Backup hears the Master's advertisement and simply re-arms, staying Backup.
    let actions = low.step(Event::PktOk(peer(150, "10.0.0.2", Some(100))));
    assert_eq!(low.state, State::Backup);
    assert_eq!(actions, vec![Action::ArmMasterDownTimer]);
}

/// Scenario 2: preemption by a higher-priority newcomer.
#[test]
fn preemption_by_higher_priority_newcomer() {
    let mut master = router(7, 120, "10.0.0.2", true);
    master.state = State::Master;

    let actions = master.step(Event::PktOk(peer(200, "10.0.0.9", Some(100))));

    assert_eq!(master.state, State::Backup);
    assert_eq!(
        actions,
        vec![
            Action::InvokeHook(HookState::Backup),
            Action::ClearAdvTimer,
            Action::ArmMasterDownTimer,
        ]
    );
}

/// Scenario 3: fast takeover on a priority-0 resignation. The Backup's
/// Master-Down timer is re-armed to skew_time alone, not the full
/// interval, and it becomes Master if nothing else arrives before that
/// shortened deadline expires.
#[test]
fn fast_takeover_on_priority_zero_resignation() {
    let mut backup = router(7, 100, "10.0.0.3", true);
    backup.enter_init();

    let actions = backup.step(Event::PktOk(peer(0, "10.0.0.2", None)));
    assert_eq!(actions, vec![Action::ArmMasterDownSkew]);
    assert_eq!(backup.state, State::Backup);

    let actions = backup.step(Event::Timer);
    assert_eq!(backup.state, State::Master);
    assert!(actions.contains(&Action::InvokeHook(HookState::Master)));
}

/// Scenario 4: equal-priority collision resolved by primary address.
#[test]
fn equal_priority_tiebreak_by_address() {
    let mut smaller = router(7, 100, "10.0.0.2", true);
    let mut larger = router(7, 100, "10.0.0.9", true);
    smaller.state = State::Master;
    larger.state = State::Master;

    let smaller_actions = smaller.step(Event::PktOk(peer(100, "10.0.0.9", None)));
    assert_eq!(smaller.state, State::Backup, "numerically smaller address yields mastership");
    assert!(!smaller_actions.is_empty());

    let larger_actions = larger.step(Event::PktOk(peer(100, "10.0.0.2", None)));
    assert_eq!(larger.state, State::Master, "numerically larger address keeps mastership");
    assert!(larger_actions.is_empty());
}

/// Scenario 5: graceful shutdown. A Master handling Reload (what SIGTERM
/// maps to in `uvrrpd::signals`) sends a priority-0 farewell, invokes
/// the backup hook, and returns to Init.
#[test]
fn graceful_shutdown_sends_priority_zero_farewell() {
    let mut master = router(7, 150, "10.0.0.2", true);
    master.state = State::Master;

    let actions = master.step(Event::Reload);

    assert_eq!(master.state, State::Init);
    assert_eq!(
        actions,
        vec![
            Action::ClearAdvTimer,
            Action::SendAdvertisementWithPriority(0),
            Action::InvokeHook(HookState::Backup),
        ]
    );
}

/// Scenario 6: checksum rejection. A bit-flipped advertisement no longer
/// matches its recomputed checksum — the property `net::validate`'s rule
/// 6 relies on to classify the packet Invalid rather than PktOk.
#[test]
fn checksum_rejection_breaks_recomputed_checksum_match() {
    let msg = VrrpMessage {
        version: Version::V3,
        vrid: 7,
        priority: 150,
        addrs: vec!["10.0.0.1".parse().unwrap()],
        interval: IntervalField::V3 { max_adv_int: 100 },
        checksum: 0,
        auth_data: None,
    };
    let saddr: IpAddr = "10.0.0.2".parse().unwrap();
    let daddr: IpAddr = "224.0.0.18".parse().unwrap();
    let mut bytes = msg.encode_with_checksum(Family::V4, saddr, daddr);
    let original_checksum = u16::from_be_bytes([bytes[6], bytes[7]]);
    bytes[6] ^= 0xFF;

    let mut zeroed = bytes.clone();
    zeroed[6] = 0;
    zeroed[7] = 0;
    let recomputed = Family::V4.checksum(Version::V3, &zeroed, saddr, daddr);

    assert_ne!(recomputed, original_checksum);
}

/// Boundary: naddr = 1 and naddr = 255 both round-trip through the codec.
#[test]
fn naddr_boundaries_round_trip() {
    for naddr in [1usize, 255] {
        let addrs: Vec<IpAddr> = (0..naddr)
            .map(|i| IpAddr::V4(std::net::Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8)))
            .collect();
        let msg = VrrpMessage {
            version: Version::V3,
            vrid: 1,
            priority: 100,
            addrs: addrs.clone(),
            interval: IntervalField::V3 { max_adv_int: 100 },
            checksum: 0,
            auth_data: None,
        };
        let saddr: IpAddr = "10.0.0.1".parse().unwrap();
        let daddr: IpAddr = "224.0.0.18".parse().unwrap();
        let bytes = msg.encode_with_checksum(Family::V4, saddr, daddr);
        let decoded = VrrpMessage::decode(&bytes, Family::V4, Version::V3).unwrap();
        assert_eq!(decoded.addrs, addrs);
    }
}

/// Boundary: adv_int = 1 (min) and 4095 (v3 max) both produce sane
/// Master-Down intervals without overflow.
#[test]
fn adv_interval_boundaries_produce_sane_master_down_intervals() {
    let mut min = router(1, 100, "10.0.0.2", true);
    min.adv_interval = 1;
    assert!(min.master_down_interval() > Duration::from_millis(0));

    let mut max = router(1, 100, "10.0.0.2", true);
    max.adv_interval = 4095;
    assert!(max.master_down_interval() < Duration::from_secs(200));
}

/// Boundary: priority 255 forces Init -> Master regardless of preempt.
#[test]
fn owner_priority_forces_master_regardless_of_preempt() {
    let mut r = router(1, 255, "10.0.0.2", false);
    r.enter_init();
    assert_eq!(r.state, State::Master);
}
