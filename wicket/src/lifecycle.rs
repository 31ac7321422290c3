//! Bridge lifecycle state machine
//!
//! The bridge moves through a small set of phases:
//!
//! ```text
//! Loading -> Running <-> Quit
//!    \________|__________/
//!             v
//!          Broken
//! ```
//!
//! Loading completes in two stages. Core targets (module bytes, atlas
//! layout blobs, atlas textures) are known up front; audio targets are only known after the
//! module is instantiated and reports its clip counts. The bridge may
//! start only once every core target is in, the clip counts are known,
//! and every declared clip has loaded. Broken is absorbing:
//! the first failure latches it and everything after the latch is inert.
//!
//! This type is deliberately free of I/O so the ordering rules can be
//! tested directly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Running,
    Quit,
    Broken,
}

#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
    core_total: usize,
    core_done: usize,
    audio_total: Option<usize>,
    audio_done: usize,
}

impl Lifecycle {
    /// Begin loading with a known number of core targets.
    pub fn new(core_total: usize) -> Self {
        Self {
            phase: Phase::Loading,
            core_total,
            core_done: 0,
            audio_total: None,
            audio_done: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// One core target finished loading.
    pub fn core_loaded_one(&mut self) {
        self.core_done = (self.core_done + 1).min(self.core_total);
    }

    /// Fraction of core targets loaded, in `[0, 1]`.
    pub fn core_ratio(&self) -> f64 {
        if self.core_total == 0 {
            1.0
        } else {
            self.core_done as f64 / self.core_total as f64
        }
    }

    pub fn core_complete(&self) -> bool {
        self.core_done >= self.core_total
    }

    /// Record the audio target count reported by the instantiated module.
    pub fn set_audio_total(&mut self, total: usize) {
        self.audio_total = Some(total);
    }

    /// One audio target finished loading.
    pub fn audio_loaded_one(&mut self) {
        if let Some(total) = self.audio_total {
            self.audio_done = (self.audio_done + 1).min(total);
        }
    }

    /// Fraction of audio targets loaded, counted by what is known to be
    /// outstanding: no clips outstanding reads as 1, including before the
    /// module has reported its counts.
    pub fn audio_ratio(&self) -> f64 {
        match self.audio_total {
            None | Some(0) => 1.0,
            Some(total) => self.audio_done as f64 / total as f64,
        }
    }

    /// True once every core and audio target is accounted for. Readiness
    /// requires the audio counts to be known, so it cannot fire before
    /// instantiation even though `audio_ratio` already reads 1.
    pub fn ready(&self) -> bool {
        self.core_complete()
            && matches!(self.audio_total, Some(total) if self.audio_done >= total)
    }

    /// Attempt the Loading -> Running transition. Returns whether it
    /// happened; call sites drive the first frame off a `true` here.
    pub fn start(&mut self) -> bool {
        if self.phase == Phase::Loading && self.ready() {
            self.phase = Phase::Running;
            true
        } else {
            false
        }
    }

    /// The module requested quit (zero continuation flag from an event or
    /// frame call).
    pub fn quit(&mut self) -> bool {
        if self.phase == Phase::Running {
            self.phase = Phase::Quit;
            true
        } else {
            false
        }
    }

    /// Restart out of Quit. Any other phase refuses.
    pub fn restart(&mut self) -> bool {
        if self.phase == Phase::Quit {
            self.phase = Phase::Running;
            true
        } else {
            false
        }
    }

    /// Latch the Broken phase. Returns `true` only for the first failure
    /// so error reporting happens exactly once.
    pub fn fail(&mut self) -> bool {
        if self.phase == Phase::Broken {
            false
        } else {
            self.phase = Phase::Broken;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_start_before_core_completes() {
        let mut lc = Lifecycle::new(2);
        assert!(!lc.start());
        lc.core_loaded_one();
        assert!(!lc.start());
        lc.core_loaded_one();
        // Core done but audio count unknown.
        assert!(!lc.start());
    }

    #[test]
    fn audio_stage_gates_start() {
        let mut lc = Lifecycle::new(1);
        lc.core_loaded_one();
        lc.set_audio_total(2);
        assert!((lc.audio_ratio() - 0.0).abs() < f64::EPSILON);
        assert!(!lc.start());
        lc.audio_loaded_one();
        assert!(!lc.start());
        lc.audio_loaded_one();
        assert!(lc.start());
        assert_eq!(lc.phase(), Phase::Running);
    }

    #[test]
    fn audio_ratio_is_one_while_counts_are_unknown() {
        // Nothing is known to be outstanding during stage-1 loading, so
        // progress reports 1.0 for audio throughout; start stays gated on
        // the counts actually arriving.
        let mut lc = Lifecycle::new(3);
        assert!((lc.audio_ratio() - 1.0).abs() < f64::EPSILON);
        lc.core_loaded_one();
        lc.core_loaded_one();
        lc.core_loaded_one();
        assert!((lc.audio_ratio() - 1.0).abs() < f64::EPSILON);
        assert!(!lc.ready());
        assert!(!lc.start());
        lc.set_audio_total(0);
        assert!(lc.ready());
        assert!(lc.start());
    }

    #[test]
    fn module_without_audio_starts_after_core() {
        let mut lc = Lifecycle::new(1);
        lc.core_loaded_one();
        lc.set_audio_total(0);
        assert!((lc.audio_ratio() - 1.0).abs() < f64::EPSILON);
        assert!(lc.start());
    }

    #[test]
    fn ratios_are_monotonic_and_capped() {
        let mut lc = Lifecycle::new(2);
        let mut last = lc.core_ratio();
        for _ in 0..4 {
            lc.core_loaded_one();
            let now = lc.core_ratio();
            assert!(now >= last);
            assert!(now <= 1.0);
            last = now;
        }
    }

    #[test]
    fn start_fires_once() {
        let mut lc = Lifecycle::new(0);
        lc.set_audio_total(0);
        assert!(lc.start());
        assert!(!lc.start());
    }

    #[test]
    fn quit_and_restart_cycle() {
        let mut lc = Lifecycle::new(0);
        lc.set_audio_total(0);
        lc.start();
        assert!(lc.quit());
        assert_eq!(lc.phase(), Phase::Quit);
        // Quit again is a no-op.
        assert!(!lc.quit());
        assert!(lc.restart());
        assert_eq!(lc.phase(), Phase::Running);
        // Restarting while running refuses.
        assert!(!lc.restart());
    }

    #[test]
    fn restart_refused_outside_quit() {
        let mut lc = Lifecycle::new(1);
        assert!(!lc.restart());
        lc.fail();
        assert!(!lc.restart());
    }

    #[test]
    fn broken_is_absorbing_and_reports_once() {
        let mut lc = Lifecycle::new(0);
        lc.set_audio_total(0);
        lc.start();
        assert!(lc.fail());
        assert!(!lc.fail());
        assert_eq!(lc.phase(), Phase::Broken);
        assert!(!lc.start());
        assert!(!lc.quit());
        assert!(!lc.restart());
    }

    #[test]
    fn failure_during_loading_latches() {
        let mut lc = Lifecycle::new(3);
        lc.core_loaded_one();
        assert!(lc.fail());
        lc.core_loaded_one();
        lc.core_loaded_one();
        lc.set_audio_total(0);
        // Fully loaded but broken stays broken.
        assert!(!lc.start());
    }
}
