use crate::clock::{Clock, ClockTick};
use crate::diff::{diff, DiffResult};
use crate::error::{EngineError, EngineResult};
use crate::notify::{Event, NotificationBus};
use crate::passage::{Passage, PassageCatalog};
use crate::records::RecordStore;
use crate::runtime::SessionEvent;
use crate::scoring::{PenalizedWpm, ScoreResult, ScoringPolicy};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info};

/// Durations offered by hosts. Any positive value is accepted.
pub const DURATION_CHOICES: [u32; 4] = [15, 30, 45, 60];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Completed,
    TimedOut,
}

/// Collaborators a session is assembled from. The record store and catalog
/// are shared; clock, randomness and bus belong to the session.
pub struct SessionContext {
    pub catalog: Arc<PassageCatalog>,
    pub records: Arc<RecordStore>,
    pub scoring: Arc<dyn ScoringPolicy>,
    pub clock: Box<dyn Clock>,
    pub rng: Box<dyn RngCore + Send>,
    pub bus: NotificationBus,
}

impl SessionContext {
    pub fn new(
        catalog: Arc<PassageCatalog>,
        records: Arc<RecordStore>,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            catalog,
            records,
            scoring: Arc::new(PenalizedWpm),
            clock: Box::new(clock),
            rng: Box::new(StdRng::from_entropy()),
            bus: NotificationBus::new(),
        }
    }

    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringPolicy>) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_bus(mut self, bus: NotificationBus) -> Self {
        self.bus = bus;
        self
    }
}

/// One tester's typing test: passage, input, countdown and phase.
///
/// Every mutation goes through `&mut self`, so a host serializes input and
/// clock ticks simply by owning the session on one thread (see
/// [`crate::runtime::Runner`]).
pub struct Session {
    catalog: Arc<PassageCatalog>,
    records: Arc<RecordStore>,
    scoring: Arc<dyn ScoringPolicy>,
    clock: Box<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    bus: NotificationBus,

    tester: String,
    language: String,
    configured_duration: u32,
    passage: Passage,
    input: Vec<char>,
    remaining_secs: u32,
    phase: Phase,
    epoch: u64,
    diff: DiffResult,
    last_score: Option<ScoreResult>,
    finish_reason: Option<FinishReason>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tester", &self.tester)
            .field("language", &self.language)
            .field("configured_duration", &self.configured_duration)
            .field("passage", &self.passage)
            .field("input", &self.input)
            .field("remaining_secs", &self.remaining_secs)
            .field("phase", &self.phase)
            .field("epoch", &self.epoch)
            .field("diff", &self.diff)
            .field("last_score", &self.last_score)
            .field("finish_reason", &self.finish_reason)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Load a passage and wait in `Idle` for the first input.
    pub fn start(
        ctx: SessionContext,
        language: &str,
        duration_secs: u32,
        tester: &str,
    ) -> EngineResult<Self> {
        if duration_secs == 0 {
            return Err(EngineError::InvalidDuration(duration_secs));
        }

        let SessionContext {
            catalog,
            records,
            scoring,
            clock,
            mut rng,
            bus,
        } = ctx;

        let passage = catalog.fetch(language, &mut *rng);
        let diff = diff(&passage, &[]);
        records.register(tester);

        info!(
            tester,
            language,
            duration_secs,
            passage_len = passage.len(),
            "session ready"
        );

        Ok(Self {
            catalog,
            records,
            scoring,
            clock,
            rng,
            bus,
            tester: tester.to_string(),
            language: language.to_string(),
            configured_duration: duration_secs,
            passage,
            input: Vec::new(),
            remaining_secs: duration_secs,
            phase: Phase::Idle,
            epoch: 0,
            diff,
            last_score: None,
            finish_reason: None,
        })
    }

    /// Dispatch one queued event. Ticks from a stopped run are dropped.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Input(buffer) => self.submit_input(&buffer),
            SessionEvent::Char(c) => self.submit_char(c),
            SessionEvent::Tick(ClockTick { epoch }) => {
                if epoch == self.epoch {
                    self.tick();
                } else {
                    debug!(epoch, current = self.epoch, "stale tick dropped");
                }
            }
        }
    }

    /// Replace the input buffer with the host's current text.
    ///
    /// # Panics
    ///
    /// If the buffer is shorter than the one already accepted while the
    /// test is running.
    pub fn submit_input(&mut self, buffer: &str) {
        if !self.accepts_input() {
            debug!(phase = ?self.phase, "input ignored");
            return;
        }
        let input: Vec<char> = buffer.chars().collect();
        assert!(
            self.phase != Phase::Running || input.len() >= self.input.len(),
            "input buffer shrank from {} to {} characters while running",
            self.input.len(),
            input.len()
        );

        self.begin_if_idle();
        self.input = input;
        self.after_input();
    }

    /// Append a single typed character.
    pub fn submit_char(&mut self, c: char) {
        if !self.accepts_input() {
            debug!(phase = ?self.phase, "input ignored");
            return;
        }
        self.begin_if_idle();
        self.input.push(c);
        self.after_input();
    }

    /// Advance the countdown by one second. No-op unless running.
    pub fn tick(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);

        if self.remaining_secs == 0 {
            self.finish(FinishReason::TimedOut);
        } else {
            let wpm = self.live_score().wpm;
            self.bus.publish(&Event::ScoringUpdate { wpm });
        }
    }

    /// Discard the attempt and load a new passage.
    pub fn reset(&mut self) {
        self.reload();
    }

    /// Try again on a freshly drawn passage.
    pub fn retry(&mut self) {
        self.reload();
    }

    /// Discard the attempt and start over on the passage already loaded.
    pub fn restart_same(&mut self) {
        self.clear_attempt();
    }

    /// Switch language and load a passage from it. Rejected while running.
    pub fn change_language(&mut self, tag: &str) -> bool {
        if self.phase == Phase::Running {
            debug!(tag, "language change ignored while running");
            return false;
        }
        self.language = tag.to_string();
        self.reload();
        info!(
            tag,
            resolved = self.catalog.resolve(tag),
            "language changed"
        );
        self.bus.publish(&Event::LanguageChanged {
            tag: tag.to_string(),
        });
        true
    }

    /// Set a new duration and reload. Ignored while running, whatever the
    /// value; otherwise zero is an error.
    pub fn change_duration(&mut self, secs: u32) -> EngineResult<bool> {
        if self.phase == Phase::Running {
            debug!(secs, "duration change ignored while running");
            return Ok(false);
        }
        if secs == 0 {
            return Err(EngineError::InvalidDuration(secs));
        }
        self.configured_duration = secs;
        self.reload();
        Ok(true)
    }

    /// Tear the attempt down from outside, e.g. on logout.
    pub fn end_session(&mut self) {
        self.clear_attempt();
        info!(tester = %self.tester, "session ended");
    }

    /// Score of the input so far, as if the test ended now.
    pub fn live_score(&self) -> ScoreResult {
        self.scoring.score(
            &self.passage,
            &self.input,
            self.elapsed_secs(),
            self.diff.error_count,
        )
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn passage(&self) -> &Passage {
        &self.passage
    }

    pub fn input(&self) -> &[char] {
        &self.input
    }

    pub fn diff(&self) -> &DiffResult {
        &self.diff
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn configured_duration(&self) -> u32 {
        self.configured_duration
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.configured_duration - self.remaining_secs
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn tester(&self) -> &str {
        &self.tester
    }

    pub fn last_score(&self) -> Option<&ScoreResult> {
        self.last_score.as_ref()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Best WPM on record for this session's tester.
    pub fn best_wpm(&self) -> f64 {
        self.records.get(&self.tester)
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    /// Epoch that ticks of the current run carry.
    pub fn clock_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bus_mut(&mut self) -> &mut NotificationBus {
        &mut self.bus
    }

    fn accepts_input(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Running)
    }

    fn begin_if_idle(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        self.epoch += 1;
        self.remaining_secs = self.configured_duration;
        self.phase = Phase::Running;
        self.clock.start(self.epoch, self.configured_duration);
        debug!(epoch = self.epoch, "test running");
    }

    fn after_input(&mut self) {
        self.diff = diff(&self.passage, &self.input);
        if self.input.len() >= self.passage.len() {
            self.finish(FinishReason::Completed);
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        self.clock.stop();
        self.phase = Phase::Finished;
        self.finish_reason = Some(reason);

        let score = self.live_score();
        let new_record = self.records.update(&self.tester, score.wpm);
        self.last_score = Some(score);

        info!(
            tester = %self.tester,
            ?reason,
            wpm = score.wpm,
            errors = score.error_count,
            elapsed_secs = score.elapsed_secs,
            new_record,
            "test finished"
        );

        self.bus.publish(&Event::TestCompleted {
            tester: self.tester.clone(),
            score,
            new_record,
        });
    }

    fn reload(&mut self) {
        self.passage = self.catalog.fetch(&self.language, &mut *self.rng);
        self.clear_attempt();
    }

    /// Back to `Idle` on the current passage with nothing of the last
    /// attempt left over.
    fn clear_attempt(&mut self) {
        self.clock.stop();
        self.input.clear();
        self.remaining_secs = self.configured_duration;
        self.phase = Phase::Idle;
        self.diff = diff(&self.passage, &self.input);
        self.last_score = None;
        self.finish_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::passage::PassagePool;
    use std::sync::mpsc;

    fn catalog(passage: &str) -> Arc<PassageCatalog> {
        Arc::new(
            PassageCatalog::from_pools(
                "English",
                vec![
                    PassagePool {
                        language: "English".to_string(),
                        passages: vec![passage.to_string()],
                    },
                    PassagePool {
                        language: "Russian".to_string(),
                        passages: vec!["Привет мир".to_string()],
                    },
                ],
            )
            .unwrap(),
        )
    }

    struct Fixture {
        session: Session,
        clock: ManualClock,
        records: Arc<RecordStore>,
        events: mpsc::Receiver<Event>,
    }

    fn fixture(passage: &str, duration: u32) -> Fixture {
        let clock = ManualClock::new();
        let records = Arc::new(RecordStore::new());
        let (tx, events) = mpsc::channel();
        let mut bus = NotificationBus::new();
        bus.subscribe(Arc::new(crate::notify::ChannelListener::new(tx)));

        let ctx = SessionContext::new(catalog(passage), Arc::clone(&records), clock.clone())
            .with_seed(11)
            .with_bus(bus);
        let session = Session::start(ctx, "English", duration, "alice").unwrap();

        Fixture {
            session,
            clock,
            records,
            events,
        }
    }

    fn type_str(session: &mut Session, s: &str) {
        for c in s.chars() {
            session.submit_char(c);
        }
    }

    fn completed(events: &mpsc::Receiver<Event>) -> Vec<ScoreResult> {
        events
            .try_iter()
            .filter_map(|e| match e {
                Event::TestCompleted { score, .. } => Some(score),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_rejects_zero_duration() {
        let ctx = SessionContext::new(
            catalog("Java is fun"),
            Arc::new(RecordStore::new()),
            ManualClock::new(),
        );
        let result = Session::start(ctx, "English", 0, "alice");
        assert!(matches!(result, Err(EngineError::InvalidDuration(0))));
    }

    #[test]
    fn test_start_is_idle_with_passage_loaded() {
        let f = fixture("Java is fun", 30);

        assert_eq!(f.session.phase(), Phase::Idle);
        assert_eq!(f.session.passage().as_str(), "Java is fun");
        assert_eq!(f.session.remaining_secs(), 30);
        assert_eq!(f.session.diff().error_count, 11);
        assert!(!f.clock.is_running());
        assert_eq!(f.records.all().get("alice"), Some(&0.0));
    }

    #[test]
    fn test_first_input_starts_clock() {
        let mut f = fixture("Java is fun", 30);

        f.session.tick();
        assert_eq!(f.session.remaining_secs(), 30);

        f.session.submit_char('J');
        assert_eq!(f.session.phase(), Phase::Running);
        assert_eq!(f.clock.epoch(), Some(f.session.clock_epoch()));
        assert_eq!(f.session.diff().correct_count(), 1);
    }

    #[test]
    fn test_completion_scores_and_records() {
        let mut f = fixture("Java is fun", 30);

        f.session.submit_char('J');
        for _ in 0..20 {
            f.session.tick();
        }
        type_str(&mut f.session, "ava is fun");

        assert_eq!(f.session.phase(), Phase::Finished);
        assert_eq!(f.session.finish_reason(), Some(FinishReason::Completed));
        assert!(!f.clock.is_running());

        let score = *f.session.last_score().unwrap();
        assert_eq!(score.error_count, 0);
        assert_eq!(score.error_percentage, 0.0);
        assert_eq!(score.elapsed_secs, 20);
        assert!((score.wpm - 6.6).abs() < 1e-9);
        assert_eq!(f.records.get("alice"), score.wpm);
        assert_eq!(completed(&f.events), vec![score]);
    }

    #[test]
    fn test_completion_with_mismatch() {
        let mut f = fixture("Java is fun", 60);

        f.session.submit_char('J');
        for _ in 0..30 {
            f.session.tick();
        }
        type_str(&mut f.session, "asa is fun");

        let score = *f.session.last_score().unwrap();
        assert_eq!(score.error_count, 1);
        assert!((score.error_percentage - 100.0 / 11.0).abs() < 1e-9);
        assert!((score.wpm - 4.36).abs() < 0.001);
    }

    #[test]
    fn test_timeout_counts_untyped_as_errors() {
        let mut f = fixture("Java is fun", 30);

        type_str(&mut f.session, "Java is");
        for _ in 0..30 {
            f.session.tick();
        }

        assert_eq!(f.session.phase(), Phase::Finished);
        assert_eq!(f.session.finish_reason(), Some(FinishReason::TimedOut));
        assert_eq!(f.session.remaining_secs(), 0);

        let score = *f.session.last_score().unwrap();
        assert_eq!(score.error_count, 4);
        assert_eq!(score.typed_chars, 7);
        assert_eq!(score.elapsed_secs, 30);
    }

    #[test]
    fn test_completion_beats_pending_timeout() {
        let mut f = fixture("hi", 2);

        f.session.submit_char('h');
        f.session.tick();
        assert_eq!(f.session.remaining_secs(), 1);

        f.session.submit_char('i');
        assert_eq!(f.session.finish_reason(), Some(FinishReason::Completed));

        f.session.tick();
        assert_eq!(f.session.remaining_secs(), 1);
        assert_eq!(completed(&f.events).len(), 1);
    }

    #[test]
    fn test_instant_completion_scores_zero() {
        let mut f = fixture("Java is fun", 30);

        f.session.submit_input("Java is fun");

        assert_eq!(f.session.phase(), Phase::Finished);
        assert_eq!(f.session.last_score().unwrap().wpm, 0.0);
        assert_eq!(f.records.get("alice"), 0.0);
    }

    #[test]
    fn test_overflow_input_still_completes() {
        let mut f = fixture("hi", 30);
        f.session.submit_input("hi there");

        assert_eq!(f.session.phase(), Phase::Finished);
        assert_eq!(f.session.last_score().unwrap().error_count, 0);
    }

    #[test]
    fn test_input_after_finish_is_ignored() {
        let mut f = fixture("hi", 30);
        type_str(&mut f.session, "hi");

        f.session.submit_char('x');
        f.session.submit_input("something else");

        assert_eq!(f.session.input(), &['h', 'i']);
        assert_eq!(f.session.phase(), Phase::Finished);
    }

    #[test]
    #[should_panic(expected = "shrank")]
    fn test_shrinking_buffer_panics() {
        let mut f = fixture("Java is fun", 30);
        f.session.submit_input("Java");
        f.session.submit_input("Ja");
    }

    #[test]
    fn test_change_duration_while_running_is_noop() {
        let mut f = fixture("Java is fun", 30);
        f.session.submit_char('J');

        assert!(!f.session.change_duration(45).unwrap());
        assert_eq!(f.session.configured_duration(), 30);
        assert_eq!(f.session.phase(), Phase::Running);
    }

    #[test]
    fn test_change_duration_from_idle() {
        let mut f = fixture("Java is fun", 30);

        assert!(f.session.change_duration(45).unwrap());
        assert_eq!(f.session.configured_duration(), 45);
        assert_eq!(f.session.remaining_secs(), 45);
    }

    #[test]
    fn test_change_duration_zero_while_running_is_noop() {
        let mut f = fixture("Java is fun", 30);
        f.session.submit_char('J');

        assert!(matches!(f.session.change_duration(0), Ok(false)));
        assert_eq!(f.session.configured_duration(), 30);
        assert_eq!(f.session.phase(), Phase::Running);
    }

    #[test]
    fn test_change_duration_zero_is_error() {
        let mut f = fixture("Java is fun", 30);
        assert!(matches!(
            f.session.change_duration(0),
            Err(EngineError::InvalidDuration(0))
        ));
        assert_eq!(f.session.configured_duration(), 30);
    }

    #[test]
    fn test_change_language() {
        let mut f = fixture("Java is fun", 30);

        assert!(f.session.change_language("Russian"));
        assert_eq!(f.session.language(), "Russian");
        assert_eq!(f.session.passage().as_str(), "Привет мир");

        let changed: Vec<Event> = f.events.try_iter().collect();
        assert_eq!(
            changed,
            vec![Event::LanguageChanged {
                tag: "Russian".to_string()
            }]
        );
    }

    #[test]
    fn test_change_language_while_running_is_noop() {
        let mut f = fixture("Java is fun", 30);
        f.session.submit_char('J');

        assert!(!f.session.change_language("Russian"));
        assert_eq!(f.session.language(), "English");
        assert_eq!(f.session.passage().as_str(), "Java is fun");
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let mut f = fixture("Java is fun", 30);

        assert!(f.session.change_language("Klingon"));
        assert_eq!(f.session.passage().as_str(), "Java is fun");
    }

    #[test]
    fn test_change_from_finished_returns_to_idle() {
        let mut f = fixture("hi", 30);
        type_str(&mut f.session, "hi");

        assert!(f.session.change_duration(15).unwrap());
        assert_eq!(f.session.phase(), Phase::Idle);
        assert!(f.session.input().is_empty());
        assert!(f.session.last_score().is_none());
    }

    #[test]
    fn test_restart_same_keeps_passage() {
        let mut f = fixture("Java is fun", 30);
        type_str(&mut f.session, "Jav");

        f.session.restart_same();

        assert_eq!(f.session.phase(), Phase::Idle);
        assert_eq!(f.session.passage().as_str(), "Java is fun");
        assert!(f.session.input().is_empty());
        assert_eq!(f.session.remaining_secs(), 30);
        assert!(!f.clock.is_running());
    }

    #[test]
    fn test_reset_stops_clock_and_clears_input() {
        let mut f = fixture("Java is fun", 30);
        type_str(&mut f.session, "Jav");
        f.session.tick();

        f.session.reset();

        assert_eq!(f.session.phase(), Phase::Idle);
        assert!(f.session.input().is_empty());
        assert_eq!(f.session.remaining_secs(), 30);
        assert!(!f.clock.is_running());
    }

    #[test]
    fn test_retry_fetches_a_new_passage() {
        let texts: Vec<String> = (0..50).map(|i| format!("passage {i}")).collect();
        let catalog = PassageCatalog::from_pools(
            "English",
            vec![PassagePool {
                language: "English".to_string(),
                passages: texts,
            }],
        )
        .unwrap();
        let ctx = SessionContext::new(
            Arc::new(catalog),
            Arc::new(RecordStore::new()),
            ManualClock::new(),
        )
        .with_seed(1);
        let mut session = Session::start(ctx, "English", 30, "alice").unwrap();

        let mut seen = std::collections::HashSet::new();
        seen.insert(session.passage().as_str().to_string());
        for _ in 0..20 {
            session.submit_input("pa");
            session.retry();
            assert_eq!(session.phase(), Phase::Idle);
            assert!(session.input().is_empty());
            seen.insert(session.passage().as_str().to_string());
        }

        assert!(seen.len() > 1);
    }

    #[test]
    fn test_end_session_from_finished_clears_result() {
        let mut f = fixture("hi", 30);
        f.session.submit_input("hi");
        assert_eq!(f.session.phase(), Phase::Finished);

        f.session.end_session();

        assert_eq!(f.session.phase(), Phase::Idle);
        assert!(f.session.input().is_empty());
        assert!(f.session.last_score().is_none());
        assert!(f.session.finish_reason().is_none());
        assert_eq!(f.session.remaining_secs(), 30);
    }

    #[test]
    fn test_end_session_from_running() {
        let mut f = fixture("Java is fun", 30);
        type_str(&mut f.session, "Jav");

        f.session.end_session();

        assert_eq!(f.session.phase(), Phase::Idle);
        assert!(!f.clock.is_running());
        assert!(completed(&f.events).is_empty());
    }

    #[test]
    fn test_stale_tick_is_dropped() {
        let mut f = fixture("Java is fun", 30);
        f.session.submit_char('J');
        let stale = f.session.clock_epoch();

        f.session.restart_same();
        f.session.submit_char('J');
        f.session.handle(SessionEvent::Tick(ClockTick { epoch: stale }));
        assert_eq!(f.session.remaining_secs(), 30);

        let current = f.session.clock_epoch();
        f.session.handle(SessionEvent::Tick(ClockTick { epoch: current }));
        assert_eq!(f.session.remaining_secs(), 29);
        assert_eq!(f.clock.starts(), 2);
    }

    #[test]
    fn test_tick_publishes_live_score() {
        let mut f = fixture("Java is fun", 30);
        type_str(&mut f.session, "Java");
        f.session.tick();

        let updates: Vec<Event> = f.events.try_iter().collect();
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], Event::ScoringUpdate { wpm } if wpm > 0.0));
    }

    #[test]
    fn test_worse_run_keeps_record() {
        let mut f = fixture("hi", 30);
        f.session.submit_char('h');
        f.session.tick();
        f.session.submit_char('i');
        let best = f.records.get("alice");
        assert!(best > 0.0);

        f.session.retry();
        f.session.submit_char('h');
        for _ in 0..10 {
            f.session.tick();
        }
        f.session.submit_char('i');

        assert!(f.session.last_score().unwrap().wpm < best);
        assert_eq!(f.records.get("alice"), best);
        assert_eq!(f.session.best_wpm(), best);
    }
}
