//! Rewind session orchestration.
//!
//! While collecting, [`ReverseManager`] captures a whole-machine snapshot at
//! every sync point (a fixed virtual-time cadence) and records every external
//! input the machine receives. A seek restores the newest snapshot at or
//! before the target and runs the machine forward, feeding recorded input
//! back at its recorded times instead of accepting live input. Replaying the
//! same log from the same snapshot reproduces the same state bit for bit, as
//! long as every non-deterministic input reaches the machine through
//! [`ReverseManager::signal_event`].

use crate::config::RewindConfig;
use crate::error::{RewindError, RewindResult};
use crate::history::{RegionBlock, ReverseChunk, ReverseHistory};
use crate::host::{HostError, RewindHost, Scheduler};
use crate::status::{GoOutcome, ReverseState, ReverseStatus};
use crate::time::EmuTime;
use log::{debug, trace, warn};
use smallvec::SmallVec;
use std::fmt;
use std::mem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Replay {
    /// Time at which the replay hands control back to live input.
    target: EmuTime,
    /// Cursor into the event log.
    next_event: usize,
    /// Recovery falls back to snapshots at or before this time.
    origin: EmuTime,
    /// End of recorded history when the replay began.
    history_end: EmuTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Session {
    Idle,
    Collecting,
    Replaying(Replay),
}

/// History moved out of one manager, ready for [`ReverseManager::transfer_history`].
#[derive(Debug)]
pub struct TransferredHistory<E> {
    pub history: ReverseHistory<E>,
    pub collect_count: u64,
    /// First event not yet applied to the machine that produced the history.
    pub event_index: usize,
}

pub struct ReverseManager<E> {
    config: RewindConfig,
    session: Session,
    history: ReverseHistory<E>,
    /// Sequence number of the last captured snapshot; 0 when not collecting.
    collect_count: u64,
    /// Next capture sync point, `None` when unregistered.
    next_capture: Option<EmuTime>,
    scratch: Vec<u8>,
}

impl<E: fmt::Debug> ReverseManager<E> {
    pub fn new(config: RewindConfig) -> Self {
        Self {
            config,
            session: Session::Idle,
            history: ReverseHistory::new(),
            collect_count: 0,
            next_capture: None,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn state(&self) -> ReverseState {
        match self.session {
            Session::Idle => ReverseState::Idle,
            Session::Collecting => ReverseState::Collecting,
            Session::Replaying(_) => ReverseState::Replaying,
        }
    }

    /// True while a history exists, including during a replay.
    pub fn is_collecting(&self) -> bool {
        self.session != Session::Idle
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.session, Session::Replaying(_))
    }

    pub fn collect_count(&self) -> u64 {
        self.collect_count
    }

    /// Replay cursor into the event log, if a replay is in flight.
    pub fn replay_index(&self) -> Option<usize> {
        match self.session {
            Session::Replaying(replay) => Some(replay.next_event),
            _ => None,
        }
    }

    pub fn history(&self) -> &ReverseHistory<E> {
        &self.history
    }

    pub fn next_capture(&self) -> Option<EmuTime> {
        self.next_capture
    }

    /// Begins collecting: fresh history, capture sync point registered, and
    /// an initial snapshot at the current time. No-op while collecting.
    pub fn start<H: RewindHost<E>>(&mut self, host: &mut H) {
        if self.session != Session::Idle {
            debug!("reverse::start ignored, state={}", self.state());
            return;
        }
        self.reset();
        self.session = Session::Collecting;
        debug!(
            "reverse::start time={} interval={}",
            host.now(),
            self.config.snapshot_interval
        );
        self.take_snapshot(&*host);
    }

    /// Stops collecting and discards the history.
    pub fn stop(&mut self) -> RewindResult<()> {
        if self.session == Session::Idle {
            return Err(RewindError::NotEnabled);
        }
        debug!(
            "reverse::stop snapshots={} events={}",
            self.history.chunk_count(),
            self.history.events().len()
        );
        self.reset();
        Ok(())
    }

    /// Feeds a live external input into the machine, recording it first
    /// when collecting. Rejected during a replay.
    pub fn signal_event<H: RewindHost<E>>(&mut self, host: &mut H, event: E) -> RewindResult<()> {
        if self.is_replaying() {
            return Err(RewindError::ReplayInProgress);
        }
        host.deliver_event(&event)?;
        if self.session == Session::Collecting {
            let now = host.now();
            trace!("reverse::event time={now} {event:?}");
            self.history.push_event(now, event);
        }
        Ok(())
    }

    /// Runs the machine to `limit`.
    ///
    /// Collecting: captures a snapshot at every sync point passed on the way.
    /// Replaying: feeds recorded events back at their times and finishes the
    /// replay once its target is reached, then keeps running live.
    pub fn run_until<H: RewindHost<E>>(&mut self, host: &mut H, limit: EmuTime) -> RewindResult<()> {
        match self.session {
            Session::Idle => {
                host.run_until(limit);
                Ok(())
            }
            Session::Collecting => {
                self.run_collecting(host, limit);
                Ok(())
            }
            Session::Replaying(replay) => self.run_replaying(host, replay, limit),
        }
    }

    /// Restores the snapshot for `requested` and arms a replay towards it.
    ///
    /// The target is clamped into the retained history. Any replay already
    /// in flight is abandoned together with its cursor. Returns the clamped
    /// target; the machine reaches it on subsequent [`Self::run_until`] calls.
    pub fn seek<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        requested: EmuTime,
    ) -> RewindResult<EmuTime> {
        let history_end = self.history_end(&*host).ok_or(RewindError::NotEnabled)?;
        if let Session::Replaying(replay) = self.session {
            debug!(
                "reverse::seek abandons replay target={} cursor={}",
                replay.target, replay.next_event
            );
        }
        let begin = self.history.begin().ok_or(RewindError::NoHistory)?;
        let target = requested.clamp(begin, history_end.max(begin));
        let origin = self
            .history
            .chunk_at_or_before(target)
            .map(ReverseChunk::time)
            .ok_or(RewindError::NoHistory)?;

        match self.go_to_snapshot(host, origin) {
            Ok(next_event) => {
                debug!(
                    "reverse::seek requested={requested} target={target} snapshot={origin} cursor={next_event}"
                );
                self.session = Session::Replaying(Replay {
                    target,
                    next_event,
                    origin,
                    history_end,
                });
                Ok(target)
            }
            Err(source) => {
                let older = self
                    .history
                    .chunk_times_at_or_before(origin)
                    .into_iter()
                    .filter(|time| *time != origin)
                    .collect();
                Err(self.recover(host, origin, older, source))
            }
        }
    }

    /// Seeks to `requested` and replays up to it.
    pub fn go<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        requested: EmuTime,
    ) -> RewindResult<GoOutcome> {
        let target = self.seek(host, requested)?;
        let snapshot_time = host.now();
        let first_event = self.replay_index().unwrap_or(0);
        self.run_until(host, target)?;
        let events_replayed = self.history.events().len().saturating_sub(first_event);
        debug!("reverse::go target={target} snapshot={snapshot_time} replayed={events_replayed}");
        Ok(GoOutcome {
            requested,
            target,
            snapshot_time,
            events_replayed,
        })
    }

    /// Goes back `ticks` from the end of the recorded history.
    pub fn go_back<H: RewindHost<E>>(&mut self, host: &mut H, ticks: u64) -> RewindResult<GoOutcome> {
        let end = self.history_end(&*host).ok_or(RewindError::NotEnabled)?;
        self.go(host, end.saturating_sub(ticks))
    }

    /// Adopts a history built by another manager, e.g. when the machine
    /// instance is replaced. Events from `event_index` on have not reached
    /// `host` yet; when any remain they are replayed before live input
    /// resumes.
    pub fn transfer_history<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        history: ReverseHistory<E>,
        old_collect_count: u64,
        event_index: usize,
    ) -> RewindResult<()> {
        if self.session != Session::Idle {
            return Err(RewindError::AlreadyCollecting);
        }
        assert!(
            event_index <= history.events().len(),
            "event index {event_index} beyond log of {} events",
            history.events().len()
        );
        self.history = history;
        self.collect_count = old_collect_count;

        let now = host.now();
        self.next_capture = Some(now.saturating_add(self.config.snapshot_interval.get()));
        let pending_end = self.history.events()[event_index..]
            .last()
            .map(|event| event.time);
        match pending_end {
            Some(last) => {
                let target = last.max(now);
                self.session = Session::Replaying(Replay {
                    target,
                    next_event: event_index,
                    origin: now,
                    history_end: target,
                });
            }
            None => {
                self.history.truncate_after(now, event_index);
                self.session = Session::Collecting;
            }
        }
        debug!(
            "reverse::transfer snapshots={} events={} cursor={event_index} state={}",
            self.history.chunk_count(),
            self.history.events().len(),
            self.state()
        );
        Ok(())
    }

    /// Moves the history out, leaving this manager idle.
    pub fn take_history(&mut self) -> RewindResult<TransferredHistory<E>> {
        let event_index = match self.session {
            Session::Idle => return Err(RewindError::NotEnabled),
            Session::Collecting => self.history.events().len(),
            Session::Replaying(replay) => replay.next_event,
        };
        let history = mem::take(&mut self.history);
        let collect_count = self.collect_count;
        self.reset();
        Ok(TransferredHistory {
            history,
            collect_count,
            event_index,
        })
    }

    pub fn status<S: Scheduler>(&self, host: &S) -> ReverseStatus {
        let current = host.now();
        let collecting = self.is_collecting();
        ReverseStatus {
            state: self.state(),
            begin: self.history.begin().filter(|_| collecting),
            end: self.history_end(host),
            current,
            snapshots: self.history.chunks().map(ReverseChunk::time).collect(),
            event_count: self.history.events().len(),
            last_event: self.history.events().last().map(|event| event.time),
            memory_bytes: self.history.memory_bytes(),
        }
    }

    fn history_end<S: Scheduler>(&self, host: &S) -> Option<EmuTime> {
        match self.session {
            Session::Idle => None,
            Session::Collecting => Some(host.now()),
            Session::Replaying(replay) => Some(replay.history_end),
        }
    }

    fn reset(&mut self) {
        self.session = Session::Idle;
        self.history = ReverseHistory::new();
        self.collect_count = 0;
        self.next_capture = None;
    }

    fn run_collecting<H: RewindHost<E>>(&mut self, host: &mut H, limit: EmuTime) {
        while let Some(due) = self.next_capture.filter(|due| *due <= limit) {
            host.run_until(due);
            self.take_snapshot(&*host);
        }
        host.run_until(limit);
    }

    fn run_replaying<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        mut replay: Replay,
        limit: EmuTime,
    ) -> RewindResult<()> {
        let stop = limit.min(replay.target);
        loop {
            match self.replay_next_event(host, &mut replay, stop) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => {
                    let at = host.now();
                    let fallback = self.history.chunk_times_at_or_before(replay.origin);
                    return Err(self.recover(host, at, fallback, source));
                }
            }
        }
        host.run_until(stop);

        if stop < replay.target {
            self.session = Session::Replaying(replay);
            return Ok(());
        }
        self.finish_replay(replay);
        self.run_collecting(host, limit);
        Ok(())
    }

    /// Delivers the next recorded event if it is due by `stop`.
    fn replay_next_event<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        replay: &mut Replay,
        stop: EmuTime,
    ) -> Result<bool, HostError> {
        let Some(next) = self.history.events().get(replay.next_event) else {
            return Ok(false);
        };
        if next.time > stop {
            return Ok(false);
        }
        host.run_until(next.time);
        host.deliver_event(&next.event)?;
        trace!(
            "reverse::replay event={} time={} {:?}",
            replay.next_event,
            next.time,
            next.event
        );
        replay.next_event += 1;
        Ok(true)
    }

    /// Hands control back to live input. Recorded history past the target
    /// no longer matches the machine and is dropped.
    fn finish_replay(&mut self, replay: Replay) {
        self.history.truncate_after(replay.target, replay.next_event);
        self.session = Session::Collecting;
        self.next_capture = Some(
            replay
                .target
                .saturating_add(self.config.snapshot_interval.get()),
        );
        debug!(
            "reverse::replay done target={} events={} snapshots={}",
            replay.target,
            replay.next_event,
            self.history.chunk_count()
        );
    }

    fn take_snapshot<H: RewindHost<E>>(&mut self, host: &H) {
        let time = host.now();
        self.collect_count += 1;
        let seq = self.collect_count;

        let mut blocks: SmallVec<[RegionBlock; 8]> = SmallVec::new();
        for region in host.regions() {
            self.scratch.clear();
            host.serialize_region(region.id, time, &mut self.scratch);
            assert_eq!(
                self.scratch.len(),
                region.size,
                "region {} ({}) serialized {} bytes, declared {}",
                region.id,
                region.name,
                self.scratch.len(),
                region.size
            );
            let block = self.history.last_blocks.create_new(region.id, &self.scratch);
            blocks.push(RegionBlock {
                id: region.id,
                block,
            });
        }

        let copies = blocks.iter().filter(|rb| rb.block.is_copy()).count();
        let chunk = ReverseChunk::new(seq, time, blocks, self.history.events().len());
        self.history.insert_chunk(chunk);
        let evicted = self.history.apply_retention(&self.config.retention, seq);
        self.next_capture = Some(time.saturating_add(self.config.snapshot_interval.get()));
        debug!(
            "reverse::capture seq={seq} time={time} copies={copies} evicted={evicted} retained={}",
            self.history.chunk_count()
        );
    }

    /// Restores every region of the snapshot at `time` and moves the clock
    /// there. Returns the snapshot's event cursor.
    fn go_to_snapshot<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        time: EmuTime,
    ) -> Result<usize, HostError> {
        let Some(chunk) = self.history.chunk(time) else {
            return Err(HostError::new(format!("no snapshot at {time}")));
        };
        for rb in chunk.blocks() {
            self.scratch.clear();
            self.scratch.resize(rb.block.size(), 0);
            rb.block.apply(&mut self.scratch);
            host.deserialize_region(rb.id, &self.scratch, time)?;
        }
        host.reset_time(time);
        Ok(chunk.next_event_index())
    }

    /// Restores the first usable snapshot from `candidates` (newest first),
    /// dropping history after it. Falls back to idle when none restores.
    fn recover<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        at: EmuTime,
        candidates: Vec<EmuTime>,
        source: HostError,
    ) -> RewindError {
        warn!("reverse: replay failed at {at}: {source}");
        for time in candidates {
            match self.go_to_snapshot(host, time) {
                Ok(event_index) => {
                    self.history.truncate_after(time, event_index);
                    self.session = Session::Collecting;
                    self.next_capture =
                        Some(time.saturating_add(self.config.snapshot_interval.get()));
                    warn!("reverse: recovered at snapshot {time}");
                    return RewindError::ReplayAborted {
                        at,
                        recovered_at: Some(time),
                        source,
                    };
                }
                Err(err) => warn!("reverse: snapshot {time} unusable: {err}"),
            }
        }
        warn!("reverse: no usable snapshot left, history discarded");
        self.reset();
        RewindError::ReplayAborted {
            at,
            recovered_at: None,
            source,
        }
    }
}
