//! ReverseManager coverage against a tiny deterministic machine.

use pretty_assertions::assert_eq;
use rewind_core::{
    EmuTime, EventSink, HostError, Region, RegionId, RetentionPolicy, ReverseCmd, ReverseHistory,
    ReverseManager, ReverseReply, ReverseState, RewindConfig, RewindError, Scheduler,
    StateRegions,
};
use std::collections::BTreeMap;
use std::num::{NonZeroU64, NonZeroUsize};

const CPU: RegionId = RegionId(0);
const RAM: RegionId = RegionId(1);
const REGIONS: [Region; 2] = [Region::new(0, "cpu", 9), Region::new(1, "ram", 64)];

/// Input log shared by most tests: (time, joypad byte).
const EVENTS: &[(u64, u8)] = &[(30, 3), (200, 7), (200, 8), (201, 9), (275, 1), (330, 4)];

/// Mixes a latched input byte into a running accumulator every tick and
/// scribbles the result over a small RAM.
#[derive(Debug)]
struct ToyMachine {
    acc: u64,
    latch: u8,
    ram: Vec<u8>,
    now: EmuTime,
    corrupt: Vec<EmuTime>,
    reject_events: bool,
}

impl ToyMachine {
    fn new() -> Self {
        Self {
            acc: 0x9e37_79b9,
            latch: 0,
            ram: vec![0; 64],
            now: EmuTime::ZERO,
            corrupt: Vec::new(),
            reject_events: false,
        }
    }

    fn step(&mut self) {
        self.acc = self
            .acc
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1 + self.latch as u64);
        let slot = (self.now.ticks() % 64) as usize;
        self.ram[slot] ^= (self.acc >> 56) as u8;
        self.now = self.now.saturating_add(1);
    }

    fn full_state(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for region in REGIONS {
            self.serialize_region(region.id, self.now, &mut out);
        }
        out
    }
}

impl StateRegions for ToyMachine {
    fn regions(&self) -> &[Region] {
        &REGIONS
    }

    fn serialize_region(&self, id: RegionId, _time: EmuTime, out: &mut Vec<u8>) {
        match id {
            CPU => {
                out.extend_from_slice(&self.acc.to_le_bytes());
                out.push(self.latch);
            }
            RAM => out.extend_from_slice(&self.ram),
            other => panic!("unknown region {other}"),
        }
    }

    fn deserialize_region(
        &mut self,
        id: RegionId,
        bytes: &[u8],
        time: EmuTime,
    ) -> Result<(), HostError> {
        if self.corrupt.contains(&time) {
            return Err(HostError::new(format!("corrupt snapshot at {time}")));
        }
        match id {
            CPU => {
                let mut acc = [0u8; 8];
                acc.copy_from_slice(&bytes[..8]);
                self.acc = u64::from_le_bytes(acc);
                self.latch = bytes[8];
            }
            RAM => self.ram.copy_from_slice(bytes),
            other => return Err(HostError::new(format!("unknown region {other}"))),
        }
        Ok(())
    }
}

impl Scheduler for ToyMachine {
    fn now(&self) -> EmuTime {
        self.now
    }

    fn reset_time(&mut self, time: EmuTime) {
        self.now = time;
    }

    fn run_until(&mut self, time: EmuTime) {
        while self.now < time {
            self.step();
        }
    }
}

impl EventSink<u8> for ToyMachine {
    fn deliver_event(&mut self, event: &u8) -> Result<(), HostError> {
        if self.reject_events {
            return Err(HostError::new("input path closed"));
        }
        self.latch = *event;
        Ok(())
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(interval: u64) -> RewindConfig {
    RewindConfig {
        ticks_per_second: NonZeroU64::new(100).unwrap(),
        ..RewindConfig::with_interval(NonZeroU64::new(interval).unwrap())
    }
}

struct Session {
    host: ToyMachine,
    mgr: ReverseManager<u8>,
    /// Live machine state at each checkpoint, after that tick's events.
    states: BTreeMap<u64, Vec<u8>>,
}

/// Starts collecting at 0 and runs live to `end`, feeding [`EVENTS`] and
/// recording the state at every checkpoint.
fn record_session(config: RewindConfig, end: u64, checkpoints: &[u64]) -> Session {
    init_logs();
    let mut host = ToyMachine::new();
    let mut mgr = ReverseManager::new(config);
    mgr.start(&mut host);

    let mut points: Vec<u64> = EVENTS.iter().map(|(t, _)| *t).collect();
    points.extend_from_slice(checkpoints);
    points.push(end);
    points.sort_unstable();
    points.dedup();

    let mut states = BTreeMap::new();
    for t in points.into_iter().filter(|t| *t <= end) {
        mgr.run_until(&mut host, t.into()).unwrap();
        for (_, byte) in EVENTS.iter().filter(|(time, _)| *time == t) {
            mgr.signal_event(&mut host, *byte).unwrap();
        }
        if checkpoints.contains(&t) {
            states.insert(t, host.full_state());
        }
    }
    Session { host, mgr, states }
}

#[test]
fn start_takes_an_initial_snapshot() {
    let mut host = ToyMachine::new();
    host.run_until(EmuTime::from_ticks(50));
    let mut mgr = ReverseManager::<u8>::new(config(100));
    assert_eq!(mgr.state(), ReverseState::Idle);

    mgr.start(&mut host);
    assert_eq!(mgr.state(), ReverseState::Collecting);
    assert_eq!(mgr.collect_count(), 1);
    assert_eq!(mgr.history().begin(), Some(EmuTime::from_ticks(50)));
    assert_eq!(mgr.next_capture(), Some(EmuTime::from_ticks(150)));

    // Already collecting: nothing changes.
    mgr.start(&mut host);
    assert_eq!(mgr.collect_count(), 1);
    assert_eq!(mgr.history().chunk_count(), 1);
}

#[test]
fn idle_manager_rejects_history_operations() {
    let mut host = ToyMachine::new();
    let mut mgr = ReverseManager::<u8>::new(config(100));
    assert!(matches!(mgr.stop(), Err(RewindError::NotEnabled)));
    assert!(matches!(
        mgr.go(&mut host, EmuTime::ZERO),
        Err(RewindError::NotEnabled)
    ));
    assert!(matches!(mgr.take_history(), Err(RewindError::NotEnabled)));

    // Live input still reaches the machine, it just is not recorded.
    mgr.signal_event(&mut host, 5).unwrap();
    assert_eq!(host.latch, 5);
    assert!(mgr.history().events().is_empty());
}

#[test]
fn snapshots_follow_the_interval() {
    let session = record_session(config(100), 350, &[]);
    let times: Vec<u64> = session
        .mgr
        .history()
        .chunks()
        .map(|chunk| chunk.time().ticks())
        .collect();
    assert_eq!(times, vec![0, 100, 200, 300]);
    let seqs: Vec<u64> = session.mgr.history().chunks().map(|c| c.seq()).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    // Events at a capture time are recorded after the capture.
    let at_200 = session
        .mgr
        .history()
        .chunk(EmuTime::from_ticks(200))
        .unwrap();
    assert_eq!(at_200.next_event_index(), 1);
    assert_eq!(session.mgr.history().events().len(), 6);
}

#[test]
fn goto_reproduces_live_state() {
    let checkpoints = [0, 42, 100, 199, 200, 270, 330, 350, 400];
    let Session {
        mut host,
        mut mgr,
        states,
    } = record_session(config(100), 400, &checkpoints);

    for t in checkpoints.iter().rev() {
        let outcome = mgr.go(&mut host, EmuTime::from_ticks(*t)).unwrap();
        assert_eq!(outcome.target, EmuTime::from_ticks(*t));
        assert_eq!(host.now(), EmuTime::from_ticks(*t));
        assert_eq!(host.full_state(), states[t], "state mismatch at {t}");
        assert_eq!(mgr.state(), ReverseState::Collecting);
    }
}

#[test]
fn go_reports_snapshot_and_replayed_events() {
    let mut session = record_session(config(100), 400, &[]);
    let outcome = session
        .mgr
        .go(&mut session.host, EmuTime::from_ticks(350))
        .unwrap();
    assert_eq!(outcome.snapshot_time, EmuTime::from_ticks(300));
    assert_eq!(outcome.events_replayed, 1);

    // Future history is gone once the replay hands back control.
    assert_eq!(session.mgr.history().events().len(), 6);
    assert_eq!(
        session.mgr.history().last_chunk().map(|c| c.time()),
        Some(EmuTime::from_ticks(300))
    );
    assert_eq!(session.mgr.next_capture(), Some(EmuTime::from_ticks(450)));
}

#[test]
fn repeated_goto_is_idempotent() {
    let mut session = record_session(config(100), 400, &[250]);
    let target = EmuTime::from_ticks(250);

    session.mgr.go(&mut session.host, target).unwrap();
    let first = session.host.full_state();
    let events = session.mgr.history().events().len();
    let chunks = session.mgr.history().chunk_count();

    session.mgr.go(&mut session.host, target).unwrap();
    assert_eq!(session.host.full_state(), first);
    assert_eq!(first, session.states[&250]);
    assert_eq!(session.mgr.history().events().len(), events);
    assert_eq!(session.mgr.history().chunk_count(), chunks);
}

#[test]
fn targets_are_clamped_to_history() {
    let mut host = ToyMachine::new();
    host.run_until(EmuTime::from_ticks(50));
    let mut mgr = ReverseManager::<u8>::new(config(100));
    mgr.start(&mut host);
    mgr.run_until(&mut host, EmuTime::from_ticks(400)).unwrap();
    let live = host.full_state();

    let outcome = mgr.go(&mut host, EmuTime::from_ticks(10_000)).unwrap();
    assert_eq!(outcome.target, EmuTime::from_ticks(400));
    assert_eq!(host.full_state(), live);

    let outcome = mgr.go(&mut host, EmuTime::ZERO).unwrap();
    assert_eq!(outcome.target, EmuTime::from_ticks(50));

    mgr.run_until(&mut host, EmuTime::from_ticks(120)).unwrap();
    let outcome = mgr.go_back(&mut host, 1_000).unwrap();
    assert_eq!(outcome.target, EmuTime::from_ticks(50));
}

#[test]
fn go_back_counts_from_end_of_history() {
    let mut session = record_session(config(100), 400, &[270]);
    let outcome = session.mgr.go_back(&mut session.host, 130).unwrap();
    assert_eq!(outcome.target, EmuTime::from_ticks(270));
    assert_eq!(session.host.full_state(), session.states[&270]);
}

#[test]
fn empty_history_reports_no_history() {
    let mut host = ToyMachine::new();
    let mut mgr = ReverseManager::<u8>::new(config(100));
    mgr.transfer_history(&mut host, ReverseHistory::new(), 0, 0)
        .unwrap();
    assert_eq!(mgr.state(), ReverseState::Collecting);
    assert!(matches!(
        mgr.go(&mut host, EmuTime::ZERO),
        Err(RewindError::NoHistory)
    ));
}

#[test]
fn live_input_is_rejected_while_replaying() {
    let mut session = record_session(config(100), 400, &[]);
    let target = session
        .mgr
        .seek(&mut session.host, EmuTime::from_ticks(150))
        .unwrap();
    assert_eq!(session.mgr.state(), ReverseState::Replaying);
    assert!(matches!(
        session.mgr.signal_event(&mut session.host, 1),
        Err(RewindError::ReplayInProgress)
    ));

    session.mgr.run_until(&mut session.host, target).unwrap();
    assert_eq!(session.mgr.state(), ReverseState::Collecting);
    session.mgr.signal_event(&mut session.host, 1).unwrap();
    assert_eq!(session.mgr.history().events().len(), 2);
}

#[test]
fn rejected_live_input_is_not_recorded() {
    let mut session = record_session(config(100), 400, &[]);
    let recorded = session.mgr.history().events().to_vec();
    let latch = session.host.latch;

    session.host.reject_events = true;
    assert!(matches!(
        session.mgr.signal_event(&mut session.host, 5),
        Err(RewindError::Host(_))
    ));
    assert_eq!(session.mgr.state(), ReverseState::Collecting);
    assert_eq!(session.mgr.history().events(), recorded.as_slice());
    assert_eq!(session.host.latch, latch);

    session.host.reject_events = false;
    session.mgr.signal_event(&mut session.host, 5).unwrap();
    let events = session.mgr.history().events();
    assert_eq!(events.len(), recorded.len() + 1);
    let last = events.last().unwrap();
    assert_eq!((last.time, last.event), (EmuTime::from_ticks(400), 5));
    assert!(events.windows(2).all(|pair| pair[0].time <= pair[1].time));
}

#[test]
fn seek_cancels_replay_in_flight() {
    let mut session = record_session(config(100), 400, &[120]);
    session
        .mgr
        .seek(&mut session.host, EmuTime::from_ticks(350))
        .unwrap();
    session
        .mgr
        .run_until(&mut session.host, EmuTime::from_ticks(320))
        .unwrap();
    assert_eq!(session.mgr.state(), ReverseState::Replaying);
    assert_eq!(session.host.now(), EmuTime::from_ticks(320));

    // The end of history is still the pre-replay end.
    let status = session.mgr.status(&session.host);
    assert_eq!(status.end, Some(EmuTime::from_ticks(400)));

    let outcome = session
        .mgr
        .go(&mut session.host, EmuTime::from_ticks(120))
        .unwrap();
    assert_eq!(outcome.snapshot_time, EmuTime::from_ticks(100));
    assert_eq!(session.host.full_state(), session.states[&120]);
    assert_eq!(session.mgr.state(), ReverseState::Collecting);
}

#[test]
fn corrupt_snapshot_falls_back_to_older_one() {
    let mut session = record_session(config(100), 400, &[]);
    session.host.corrupt.push(EmuTime::from_ticks(300));

    let err = session
        .mgr
        .go(&mut session.host, EmuTime::from_ticks(350))
        .unwrap_err();
    match err {
        RewindError::ReplayAborted {
            at, recovered_at, ..
        } => {
            assert_eq!(at, EmuTime::from_ticks(300));
            assert_eq!(recovered_at, Some(EmuTime::from_ticks(200)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.mgr.state(), ReverseState::Collecting);
    assert_eq!(session.host.now(), EmuTime::from_ticks(200));
    assert_eq!(
        session.mgr.history().last_chunk().map(|c| c.time()),
        Some(EmuTime::from_ticks(200))
    );
    assert_eq!(session.mgr.history().events().len(), 1);

    // Collection carries on from the recovered point.
    session.host.corrupt.clear();
    session
        .mgr
        .run_until(&mut session.host, EmuTime::from_ticks(300))
        .unwrap();
    assert_eq!(session.mgr.history().chunk_count(), 4);
}

#[test]
fn rejected_replay_event_restores_origin_snapshot() {
    let mut session = record_session(config(100), 400, &[]);
    session.host.reject_events = true;

    let err = session
        .mgr
        .go(&mut session.host, EmuTime::from_ticks(250))
        .unwrap_err();
    assert!(matches!(
        err,
        RewindError::ReplayAborted {
            recovered_at: Some(t),
            ..
        } if t == EmuTime::from_ticks(200)
    ));
    assert_eq!(session.mgr.state(), ReverseState::Collecting);
    assert_eq!(session.mgr.history().events().len(), 1);
}

#[test]
fn unrecoverable_history_resets_to_idle() {
    let mut session = record_session(config(100), 400, &[]);
    session.host.corrupt = session.mgr.history().chunks().map(|c| c.time()).collect();

    let err = session
        .mgr
        .go(&mut session.host, EmuTime::from_ticks(250))
        .unwrap_err();
    assert!(matches!(
        err,
        RewindError::ReplayAborted {
            recovered_at: None,
            ..
        }
    ));
    assert_eq!(session.mgr.state(), ReverseState::Idle);
    assert!(session.mgr.history().is_empty());
    assert_eq!(session.mgr.status(&session.host).begin, None);
}

#[test]
fn transferred_history_keeps_collecting() {
    let mut session = record_session(config(100), 400, &[]);
    let taken = session.mgr.take_history().unwrap();
    assert_eq!(session.mgr.state(), ReverseState::Idle);
    assert_eq!(taken.collect_count, 5);
    assert_eq!(taken.event_index, 6);

    let mut next = ReverseManager::new(config(100));
    next.transfer_history(
        &mut session.host,
        taken.history,
        taken.collect_count,
        taken.event_index,
    )
    .unwrap();
    assert_eq!(next.state(), ReverseState::Collecting);
    assert_eq!(next.history().chunk_count(), 5);

    next.run_until(&mut session.host, EmuTime::from_ticks(500))
        .unwrap();
    assert_eq!(next.history().last_chunk().map(|c| c.seq()), Some(6));

    // The giving side is idle and can be started afresh.
    session.mgr.start(&mut session.host);
    assert!(matches!(
        next.transfer_history(&mut session.host, ReverseHistory::new(), 0, 0),
        Err(RewindError::AlreadyCollecting)
    ));
}

#[test]
fn history_taken_mid_replay_finishes_on_new_manager() {
    let mut session = record_session(config(100), 400, &[330]);
    session
        .mgr
        .seek(&mut session.host, EmuTime::from_ticks(150))
        .unwrap();
    let taken = session.mgr.take_history().unwrap();
    assert_eq!(taken.event_index, 1);

    let mut next = ReverseManager::new(config(100));
    next.transfer_history(
        &mut session.host,
        taken.history,
        taken.collect_count,
        taken.event_index,
    )
    .unwrap();
    assert_eq!(next.state(), ReverseState::Replaying);
    assert_eq!(next.replay_index(), Some(1));

    next.run_until(&mut session.host, EmuTime::from_ticks(330))
        .unwrap();
    assert_eq!(next.state(), ReverseState::Collecting);
    assert_eq!(session.host.full_state(), session.states[&330]);
    assert_eq!(next.history().events().len(), 6);
}

#[test]
fn status_reports_history_bounds() {
    let mut session = record_session(config(100), 400, &[]);
    let status = session.mgr.status(&session.host);
    assert_eq!(status.state, ReverseState::Collecting);
    assert_eq!(status.begin, Some(EmuTime::ZERO));
    assert_eq!(status.end, Some(EmuTime::from_ticks(400)));
    assert_eq!(status.current, EmuTime::from_ticks(400));
    assert_eq!(status.snapshots.len(), 5);
    assert_eq!(status.event_count, 6);
    assert_eq!(status.last_event, Some(EmuTime::from_ticks(330)));
    assert!(status.memory_bytes > 0);

    session.mgr.stop().unwrap();
    let status = session.mgr.status(&session.host);
    assert_eq!(status.state, ReverseState::Idle);
    assert_eq!(status.end, None);
    assert_eq!(status.memory_bytes, 0);
}

#[test]
fn retention_keeps_history_bounded_and_replayable() {
    let config = RewindConfig {
        retention: RetentionPolicy {
            keep_recent: NonZeroUsize::new(2).unwrap(),
            max_snapshots: NonZeroUsize::new(4),
        },
        ..config(10)
    };
    let Session {
        mut host,
        mut mgr,
        states,
    } = record_session(config, 1_000, &[995]);
    assert!(mgr.history().chunk_count() <= 4);
    assert_eq!(
        mgr.history().last_chunk().map(|c| c.time()),
        Some(EmuTime::from_ticks(1_000))
    );
    // every event predates the oldest kept snapshot
    assert!(mgr.history().events().is_empty());
    assert!(mgr.history().chunks().all(|c| c.next_event_index() == 0));

    mgr.go(&mut host, EmuTime::from_ticks(995)).unwrap();
    assert_eq!(host.full_state(), states[&995]);
}

#[test]
fn commands_drive_the_manager() {
    let mut session = record_session(config(100), 400, &[250, 300]);

    let reply = session
        .mgr
        .execute(&mut session.host, "reverse goto 2.5".parse().unwrap())
        .unwrap();
    match reply {
        ReverseReply::Moved(outcome) => assert_eq!(outcome.target, EmuTime::from_ticks(250)),
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(session.host.full_state(), session.states[&250]);

    let reply = session
        .mgr
        .execute(&mut session.host, ReverseCmd::Status)
        .unwrap();
    assert!(matches!(reply, ReverseReply::Status(status) if status.end == Some(EmuTime::from_ticks(250))));

    assert_eq!(
        session
            .mgr
            .execute(&mut session.host, ReverseCmd::Stop)
            .unwrap(),
        ReverseReply::Stopped
    );
    assert!(matches!(
        session.mgr.execute(&mut session.host, ReverseCmd::Stop),
        Err(RewindError::NotEnabled)
    ));
    assert_eq!(
        session
            .mgr
            .execute(&mut session.host, ReverseCmd::Start)
            .unwrap(),
        ReverseReply::Started
    );
}
