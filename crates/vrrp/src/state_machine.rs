//! VRRP state machine: a pure, synchronous transition function.
//!
//! Grounded on the teacher's `state_machine.rs` (`VRRPNode`, Init/Backup/
//! Master transitions) for the overall state shape, but the teacher's
//! `tokio::select!`-driven polling loop is replaced with a plain
//! `VirtualRouter::step(event) -> Vec<Action>` function per
//! `original_source/vrrp_state.c`'s transition table — the FSM itself does
//! no I/O, so it is unit-testable without a runtime. `uvrrpd::daemon`'s
//! event loop (C6) is the only caller, and it is the one that turns
//! `Action`s into socket sends, hook invocations, and timer arm/clear
//! calls.

use std::cmp::Ordering;
use std::net::IpAddr;

use crate::types::{State, Version, VirtualRouter};

/// A validated inbound advertisement, as produced by `net::validate`'s
/// `RecvEvent::Ok` arm — just the fields the FSM's transition rules
/// actually consult.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerAdvertisement {
    pub priority: u8,
    pub source: IpAddr,
    /// v3's `Max_Advertisement_Interval`, learned from the wire. `None` under v2.
    pub max_adv_int: Option<u16>,
}

/// Inputs the FSM reacts to. `VridMismatch` and `Invalid` are accepted so
/// callers can route every `net::RecvEvent` straight into `step` without a
/// prior match, but both are no-ops per RFC (discard, don't re-arm).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Timer,
    PktOk(PeerAdvertisement),
    VridMismatch(u8),
    Invalid(String),
    /// The control channel's `reload` command, or SIGHUP.
    Reload,
}

/// Which hook-script `state` argument to pass (RFC 5798 section 6.4's
/// notifications, `vrrp_exec.c`'s `vrrp_build_args`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Master,
    Backup,
}

/// Side effects `step`/`enter_init` ask the caller to perform. The FSM
/// itself never touches a socket, a timer's clock, or a child process —
/// it only decides what should happen and mutates `self.state` /
/// `self.master_adv_interval` in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendAdvertisement,
    /// The shutdown/graceful-withdrawal farewell (RFC 5798 section 6.4.2).
    SendAdvertisementWithPriority(u8),
    /// One gratuitous ARP (v4) or unsolicited NA (v6) per VIP, reverse order.
    SendTopologyBurst,
    ArmAdvTimer,
    ArmMasterDownTimer,
    /// The fast-takeover window on a priority-0 advertisement: `skew_time` only.
    ArmMasterDownSkew,
    ClearAdvTimer,
    ClearMasterDownTimer,
    InvokeHook(HookState),
}

impl VirtualRouter {
    /// Run once at startup, with `self.state == State::Init`. Per RFC
    /// 5798 section 6.4.1: the address owner (`priority == 255`) goes
    /// straight to Master; everyone else waits out a full
    /// `Master_Down_Interval` as Backup. The hook is NOT invoked on this
    /// first entry to Backup — only on the Init->Master path, and on
    /// every later Master/Backup transition.
    pub fn enter_init(&mut self) -> Vec<Action> {
        debug_assert_eq!(self.state, State::Init, "enter_init called outside Init");

        if self.is_owner() {
            self.state = State::Master;
            vec![
                Action::SendAdvertisement,
                Action::SendTopologyBurst,
                Action::InvokeHook(HookState::Master),
                Action::ArmAdvTimer,
            ]
        } else {
            self.master_adv_interval = Some(self.adv_interval);
            self.state = State::Backup;
            vec![Action::ArmMasterDownTimer]
        }
    }

    /// Dispatch `event` according to the current state. The loop never
    /// calls `step` while state is `Init` — `enter_init` already
    /// advanced it synchronously at startup — but routing through
    /// `enter_init` here keeps the function total rather than panicking.
    pub fn step(&mut self, event: Event) -> Vec<Action> {
        match self.state {
            State::Init => self.enter_init(),
            State::Backup => self.step_backup(event),
            State::Master => self.step_master(event),
        }
    }

    fn step_backup(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Timer => {
                self.state = State::Master;
                vec![
                    Action::SendAdvertisement,
                    Action::SendTopologyBurst,
                    Action::InvokeHook(HookState::Master),
                    Action::ArmAdvTimer,
                ]
            }
            Event::PktOk(peer) => {
                if peer.priority == 0 {
                    // Fast takeover: the current Master is resigning.
                    vec![Action::ArmMasterDownSkew]
                } else if peer.priority >= self.priority || !self.preempt {
                    self.learn_master_adv_interval(peer.max_adv_int);
                    vec![Action::ArmMasterDownTimer]
                } else {
                    // Lower-priority peer and preemption enabled: ignore.
                    vec![]
                }
            }
            Event::Reload => {
                self.state = State::Init;
                vec![Action::ClearMasterDownTimer]
            }
            Event::VridMismatch(_) | Event::Invalid(_) => vec![],
        }
    }

    fn step_master(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Timer => vec![Action::SendAdvertisement, Action::ArmAdvTimer],
            Event::PktOk(peer) => {
                if peer.priority == 0 {
                    // A stray priority-0 packet while we're already Master:
                    // re-assert ours immediately.
                    vec![Action::SendAdvertisement, Action::ArmAdvTimer]
                } else if peer.priority > self.priority {
                    self.transition_to_backup(peer.max_adv_int)
                } else if peer.priority == self.priority && self.loses_tiebreak(peer.source) {
                    self.transition_to_backup(peer.max_adv_int)
                } else {
                    vec![]
                }
            }
            Event::Reload => {
                self.state = State::Init;
                vec![
                    Action::ClearAdvTimer,
                    Action::SendAdvertisementWithPriority(0),
                    Action::InvokeHook(HookState::Backup),
                ]
            }
            Event::VridMismatch(_) | Event::Invalid(_) => vec![],
        }
    }

    /// RFC 5798 section 6.4.3's equal-priority tie-break: the router with
    /// the numerically larger primary address stays Master. Unsigned,
    /// big-endian lexicographic comparison — a v4 address as a 32-bit
    /// scalar, a v6 address byte-wise. Two routers sharing a primary
    /// address is forbidden by the RFC, so this is never an exact tie.
    fn loses_tiebreak(&self, peer_source: IpAddr) -> bool {
        self.family.addr_cmp(peer_source, self.net.primary_addr) == Ordering::Greater
    }

    fn learn_master_adv_interval(&mut self, peer_max_adv_int: Option<u16>) {
        if self.version == Version::V3 {
            if let Some(max) = peer_max_adv_int {
                self.master_adv_interval = Some(max);
            }
        }
    }

    fn transition_to_backup(&mut self, peer_max_adv_int: Option<u16>) -> Vec<Action> {
        self.state = State::Backup;
        self.learn_master_adv_interval(peer_max_adv_int);
        vec![
            Action::InvokeHook(HookState::Backup),
            Action::ClearAdvTimer,
            Action::ArmMasterDownTimer,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipx::Family;
    use crate::types::{NetContext, Vip};

    fn router(version: Version, priority: u8, adv_interval: u16, preempt: bool) -> VirtualRouter {
        VirtualRouter {
            vrid: 7,
            version,
            family: Family::V4,
            priority,
            vips: vec![Vip::host("10.0.0.1".parse().unwrap())],
            preempt,
            auth_data: None,
            adv_interval,
            master_adv_interval: None,
            net: NetContext {
                ifname: "eth0".into(),
                if_index: 1,
                if_mac: [0; 6],
                primary_addr: "10.0.0.2".parse().unwrap(),
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

    #[test]
    fn owner_goes_straight_to_master() {
        let mut r = router(Version::V3, 255, 100, true);
        let actions = r.enter_init();
        assert_eq!(r.state, State::Master);
        assert!(actions.contains(&Action::InvokeHook(HookState::Master)));
        assert!(actions.contains(&Action::ArmAdvTimer));
    }

    #[test]
    fn non_owner_enters_backup_without_hook() {
        let mut r = router(Version::V3, 100, 100, true);
        let actions = r.enter_init();
        assert_eq!(r.state, State::Backup);
        assert_eq!(actions, vec![Action::ArmMasterDownTimer]);
        assert_eq!(r.master_adv_interval, Some(100));
    }

    #[test]
    fn backup_masterdown_expiry_becomes_master() {
        let mut r = router(Version::V3, 100, 100, true);
        r.enter_init();
        let actions = r.step(Event::Timer);
        assert_eq!(r.state, State::Master);
        assert!(actions.contains(&Action::InvokeHook(HookState::Master)));
    }

    #[test]
    fn backup_priority_zero_triggers_fast_takeover_window() {
        let mut r = router(Version::V3, 100, 100, true);
        r.enter_init();
        let actions = r.step(Event::PktOk(peer(0, "10.0.0.3", None)));
        assert_eq!(r.state, State::Backup);
        assert_eq!(actions, vec![Action::ArmMasterDownSkew]);
    }

    #[test]
    fn backup_learns_master_adv_interval_from_higher_priority_peer() {
        let mut r = router(Version::V3, 100, 100, true);
        r.enter_init();
        r.step(Event::PktOk(peer(150, "10.0.0.3", Some(200))));
        assert_eq!(r.master_adv_interval, Some(200));
    }

    #[test]
    fn backup_ignores_lower_priority_peer_when_preempt_is_on() {
        let mut r = router(Version::V3, 100, 100, true);
        r.enter_init();
        let actions = r.step(Event::PktOk(peer(50, "10.0.0.3", Some(200))));
        assert!(actions.is_empty());
        assert_eq!(r.master_adv_interval, Some(100));
    }

    #[test]
    fn backup_with_preempt_off_still_rearms_on_lower_priority_peer() {
        let mut r = router(Version::V3, 100, 100, false);
        r.enter_init();
        let actions = r.step(Event::PktOk(peer(50, "10.0.0.3", Some(200))));
        assert_eq!(actions, vec![Action::ArmMasterDownTimer]);
    }

    #[test]
    fn backup_reload_goes_to_init_without_hook() {
        let mut r = router(Version::V3, 100, 100, true);
        r.enter_init();
        let actions = r.step(Event::Reload);
        assert_eq!(r.state, State::Init);
        assert_eq!(actions, vec![Action::ClearMasterDownTimer]);
    }

    #[test]
    fn master_preempted_by_higher_priority_peer() {
        let mut r = router(Version::V3, 120, 100, true);
        r.state = State::Master;
        let actions = r.step(Event::PktOk(peer(200, "10.0.0.9", Some(100))));
        assert_eq!(r.state, State::Backup);
        assert_eq!(
            actions,
            vec![
                Action::InvokeHook(HookState::Backup),
                Action::ClearAdvTimer,
                Action::ArmMasterDownTimer,
            ]
        );
    }

    #[test]
    fn master_equal_priority_loses_tiebreak_to_larger_address() {
        let mut r = router(Version::V3, 100, 100, true);
        r.state = State::Master;
        // net.primary_addr is 10.0.0.2; a peer at 10.0.0.9 is numerically larger.
        let actions = r.step(Event::PktOk(peer(100, "10.0.0.9", None)));
        assert_eq!(r.state, State::Backup);
        assert!(!actions.is_empty());
    }

    #[test]
    fn master_equal_priority_keeps_mastership_against_smaller_address() {
        let mut r = router(Version::V3, 100, 100, true);
        r.state = State::Master;
        let actions = r.step(Event::PktOk(peer(100, "10.0.0.1", None)));
        assert_eq!(r.state, State::Master);
        assert!(actions.is_empty());
    }

    #[test]
    fn master_priority_zero_peer_reasserts_immediately() {
        let mut r = router(Version::V3, 100, 100, true);
        r.state = State::Master;
        let actions = r.step(Event::PktOk(peer(0, "10.0.0.9", None)));
        assert_eq!(r.state, State::Master);
        assert_eq!(actions, vec![Action::SendAdvertisement, Action::ArmAdvTimer]);
    }

    #[test]
    fn master_reload_resigns_with_priority_zero() {
        let mut r = router(Version::V3, 100, 100, true);
        r.state = State::Master;
        let actions = r.step(Event::Reload);
        assert_eq!(r.state, State::Init);
        assert_eq!(
            actions,
            vec![
                Action::ClearAdvTimer,
                Action::SendAdvertisementWithPriority(0),
                Action::InvokeHook(HookState::Backup),
            ]
        );
    }

    #[test]
    fn master_discards_vrid_mismatch_and_invalid() {
        let mut r = router(Version::V3, 100, 100, true);
        r.state = State::Master;
        assert!(r.step(Event::VridMismatch(9)).is_empty());
        assert!(r.step(Event::Invalid("bad checksum".into())).is_empty());
        assert_eq!(r.state, State::Master);
    }

    #[test]
    fn v2_does_not_learn_master_adv_interval() {
        let mut r = router(Version::V2, 100, 1, true);
        r.enter_init();
        r.step(Event::PktOk(peer(150, "10.0.0.3", None)));
        assert_eq!(r.master_adv_interval, Some(1));
    }
}
