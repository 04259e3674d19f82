//! Scroll-spy: which heading is the reader currently looking at?
//!
//! [`ScrollSpy`] owns the active heading id for one document view. It is fed
//! batches of [`VisibilityEntry`] values produced by a [`BandObserver`], the
//! single observation registration handed out per heading sequence.
//!
//! A heading is "in view" when its anchor intersects the active band: the
//! viewport shrunk by 20% from the top and 70% from the bottom. Among the
//! intersecting anchors of a batch the topmost wins.

use std::collections::{HashMap, HashSet};

use crate::toc::HeadingDescriptor;

// ---------------------------------------------------------------------------
// Active band
// ---------------------------------------------------------------------------

/// Viewport margins, as fractions of the viewport height, that define the
/// band in which a heading counts as active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveBand {
    pub top_margin: f64,
    pub bottom_margin: f64,
}

impl Default for ActiveBand {
    fn default() -> Self {
        Self {
            top_margin: 0.20,
            bottom_margin: 0.70,
        }
    }
}

impl ActiveBand {
    /// Band bounds `(top, bottom)` in viewport coordinates.
    pub fn bounds(&self, viewport_height: f64) -> (f64, f64) {
        let top = viewport_height * self.top_margin;
        let bottom = viewport_height - viewport_height * self.bottom_margin;
        (top, bottom)
    }

    /// Whether an element spanning `[top, top + height)` overlaps the band.
    pub fn intersects(&self, top: f64, height: f64, viewport_height: f64) -> bool {
        let (band_top, band_bottom) = self.bounds(viewport_height);
        top < band_bottom && top + height > band_top
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// Rendered position of a heading anchor, in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: String,
    /// Offset of the anchor's top edge from the top of the document.
    pub top: f64,
    pub height: f64,
}

/// One element of a visibility batch.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEntry {
    pub id: String,
    /// Top edge in viewport coordinates at the time of the scan.
    pub top: f64,
    pub intersecting: bool,
}

/// Token tying visibility batches to the heading sequence they were
/// observed for. Batches carrying a superseded registration are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration(u64);

/// Lifecycle of a [`ScrollSpy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpyState {
    /// No headings observed yet for the current sequence.
    Uninitialized,
    /// Observation attached; batches update the active id.
    Tracking,
    /// Observation released; nothing mutates the active id any more.
    TornDown,
}

// ---------------------------------------------------------------------------
// Band observer
// ---------------------------------------------------------------------------

/// Observation registration for one heading sequence.
///
/// Like a browser `IntersectionObserver`, a scan reports only the targets
/// whose intersection state changed since the previous scan; the first scan
/// reports every target.
#[derive(Debug)]
pub struct BandObserver {
    registration: Registration,
    band: ActiveBand,
    targets: Vec<Anchor>,
    last: HashMap<String, bool>,
}

impl BandObserver {
    pub fn registration(&self) -> Registration {
        self.registration
    }

    pub fn targets(&self) -> &[Anchor] {
        &self.targets
    }

    /// Compute the visibility batch for a viewport scrolled to `scroll_offset`
    /// with the given height. Returns an empty batch when nothing changed.
    pub fn scan(&mut self, scroll_offset: f64, viewport_height: f64) -> Vec<VisibilityEntry> {
        let mut batch = Vec::new();
        for target in &self.targets {
            let top = target.top - scroll_offset;
            let intersecting = self.band.intersects(top, target.height, viewport_height);
            let previous = self.last.insert(target.id.clone(), intersecting);
            if previous != Some(intersecting) {
                batch.push(VisibilityEntry {
                    id: target.id.clone(),
                    top,
                    intersecting,
                });
            }
        }
        batch
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Active-heading tracker owned by one document view.
#[derive(Debug)]
pub struct ScrollSpy {
    state: SpyState,
    generation: u64,
    band: ActiveBand,
    observed: HashSet<String>,
    active_id: Option<String>,
}

impl Default for ScrollSpy {
    fn default() -> Self {
        Self::new(ActiveBand::default())
    }
}

impl ScrollSpy {
    pub fn new(band: ActiveBand) -> Self {
        Self {
            state: SpyState::Uninitialized,
            generation: 0,
            band,
            observed: HashSet::new(),
            active_id: None,
        }
    }

    pub fn state(&self) -> SpyState {
        self.state
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Start over for a new heading sequence.
    ///
    /// Any current observation is torn down first, then the tracker returns
    /// to [`SpyState::Uninitialized`] with no active id.
    pub fn reset(&mut self) {
        self.teardown();
        self.state = SpyState::Uninitialized;
        self.active_id = None;
    }

    /// Attach observation to the rendered anchors of `headings`.
    ///
    /// Headings whose id has no rendered anchor are skipped. When at least
    /// one heading resolves, the tracker moves to [`SpyState::Tracking`], the
    /// active id is seeded with the first resolved heading in document order,
    /// and the returned observer is the sequence's only registration.
    /// Returns `None` (and stays uninitialized) otherwise, or when the
    /// tracker is not uninitialized.
    pub fn attach(
        &mut self,
        headings: &[HeadingDescriptor],
        anchors: &[Anchor],
    ) -> Option<BandObserver> {
        if self.state != SpyState::Uninitialized {
            log::debug!("[spy] attach ignored state={:?}", self.state);
            return None;
        }

        let by_id: HashMap<&str, &Anchor> = anchors.iter().map(|a| (a.id.as_str(), a)).collect();
        let mut targets = Vec::new();
        let mut skipped = 0usize;
        for heading in headings {
            match by_id.get(heading.id.as_str()) {
                Some(anchor) => targets.push((*anchor).clone()),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::debug!("[spy] missing-anchors count={skipped}");
        }

        let first = targets.first()?.id.clone();

        self.generation += 1;
        self.state = SpyState::Tracking;
        self.observed = targets.iter().map(|t| t.id.clone()).collect();
        self.active_id = Some(first);
        log::debug!(
            "[spy] tracking generation={} targets={}",
            self.generation,
            targets.len()
        );

        Some(BandObserver {
            registration: Registration(self.generation),
            band: self.band,
            targets,
            last: HashMap::new(),
        })
    }

    /// Apply one visibility batch. Returns `true` when the active id changed.
    ///
    /// The topmost intersecting entry wins; entries are compared by vertical
    /// position only and the first of equal positions is kept. A batch with
    /// no intersecting entries leaves the active id as it was.
    pub fn observe(&mut self, registration: Registration, batch: &[VisibilityEntry]) -> bool {
        if self.state != SpyState::Tracking || registration != Registration(self.generation) {
            return false;
        }

        let topmost = batch
            .iter()
            .filter(|e| e.intersecting && self.observed.contains(&e.id))
            .min_by(|a, b| a.top.total_cmp(&b.top));

        match topmost {
            Some(entry) if self.active_id.as_deref() != Some(entry.id.as_str()) => {
                self.active_id = Some(entry.id.clone());
                true
            }
            _ => false,
        }
    }

    /// Release observation. Idempotent; the active id is kept for display
    /// but never updated again for this sequence.
    pub fn teardown(&mut self) {
        if self.state == SpyState::Tracking {
            log::debug!("[spy] teardown generation={}", self.generation);
            self.observed.clear();
            self.state = SpyState::TornDown;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::extract;

    fn anchor(id: &str, top: f64) -> Anchor {
        Anchor {
            id: id.to_owned(),
            top,
            height: 1.0,
        }
    }

    fn entry(id: &str, top: f64, intersecting: bool) -> VisibilityEntry {
        VisibilityEntry {
            id: id.to_owned(),
            top,
            intersecting,
        }
    }

    fn tracking(src: &str, anchors: &[Anchor]) -> (ScrollSpy, BandObserver) {
        let mut spy = ScrollSpy::default();
        let observer = spy
            .attach(&extract(src), anchors)
            .expect("headings resolve");
        (spy, observer)
    }

    #[test]
    fn band_bounds() {
        let band = ActiveBand::default();
        let (top, bottom) = band.bounds(100.0);
        assert!((top - 20.0).abs() < 1e-9);
        assert!((bottom - 30.0).abs() < 1e-9);
        assert!(band.intersects(25.0, 1.0, 100.0));
        assert!(band.intersects(19.5, 1.0, 100.0));
        assert!(!band.intersects(10.0, 1.0, 100.0));
        assert!(!band.intersects(30.0, 1.0, 100.0));
    }

    #[test]
    fn band_bottom_edge_is_exclusive() {
        let band = ActiveBand::default();
        for (height, edge) in [(10.0, 3.0), (20.0, 6.0), (40.0, 12.0), (50.0, 15.0), (1000.0, 300.0)] {
            assert_eq!(band.bounds(height).1, edge);
            assert!(!band.intersects(edge, 1.0, height), "height {height}");
            assert!(band.intersects(edge - 0.5, 1.0, height), "height {height}");
        }
    }

    #[test]
    fn starts_uninitialized_without_active_id() {
        let spy = ScrollSpy::default();
        assert_eq!(spy.state(), SpyState::Uninitialized);
        assert_eq!(spy.active_id(), None);
    }

    #[test]
    fn attach_seeds_first_heading() {
        let (spy, observer) = tracking(
            "# A\n## B\n## C\n",
            &[anchor("a", 0.0), anchor("b", 40.0), anchor("c", 90.0)],
        );
        assert_eq!(spy.state(), SpyState::Tracking);
        assert_eq!(spy.active_id(), Some("a"));
        assert_eq!(observer.targets().len(), 3);
    }

    #[test]
    fn empty_sequence_never_tracks() {
        let mut spy = ScrollSpy::default();
        assert!(spy.attach(&[], &[anchor("a", 0.0)]).is_none());
        assert_eq!(spy.state(), SpyState::Uninitialized);
        assert_eq!(spy.active_id(), None);
    }

    #[test]
    fn no_resolved_anchor_never_tracks() {
        let mut spy = ScrollSpy::default();
        assert!(spy.attach(&extract("# A\n"), &[anchor("other", 0.0)]).is_none());
        assert_eq!(spy.state(), SpyState::Uninitialized);
        assert_eq!(spy.active_id(), None);
    }

    #[test]
    fn topmost_intersecting_entry_wins() {
        let (mut spy, observer) = tracking(
            "# A\n# B\n# C\n",
            &[anchor("a", 100.0), anchor("b", 50.0), anchor("c", 200.0)],
        );
        let changed = spy.observe(
            observer.registration(),
            &[
                entry("a", 100.0, true),
                entry("b", 50.0, true),
                entry("c", 200.0, true),
            ],
        );
        assert!(changed);
        assert_eq!(spy.active_id(), Some("b"));
    }

    #[test]
    fn equal_positions_keep_first_in_batch() {
        let (mut spy, observer) = tracking("# A\n# B\n", &[anchor("a", 0.0), anchor("b", 0.0)]);
        spy.observe(
            observer.registration(),
            &[entry("b", 10.0, true), entry("a", 10.0, true)],
        );
        assert_eq!(spy.active_id(), Some("b"));
    }

    #[test]
    fn non_intersecting_batch_leaves_active_unchanged() {
        let (mut spy, observer) = tracking("# A\n# B\n", &[anchor("a", 0.0), anchor("b", 50.0)]);
        spy.observe(observer.registration(), &[entry("b", 5.0, true)]);
        assert_eq!(spy.active_id(), Some("b"));

        let changed = spy.observe(
            observer.registration(),
            &[entry("a", -40.0, false), entry("b", -5.0, false)],
        );
        assert!(!changed);
        assert_eq!(spy.active_id(), Some("b"));
    }

    #[test]
    fn missing_anchor_is_never_active() {
        // "b" was never rendered, so it is not observed.
        let (mut spy, observer) = tracking("# A\n# B\n", &[anchor("a", 0.0)]);
        spy.observe(observer.registration(), &[entry("b", 1.0, true)]);
        assert_eq!(spy.active_id(), Some("a"));
    }

    #[test]
    fn seed_skips_unresolved_first_heading() {
        let (spy, _observer) = tracking("# A\n# B\n", &[anchor("b", 10.0)]);
        assert_eq!(spy.active_id(), Some("b"));
    }

    #[test]
    fn teardown_stops_updates() {
        let (mut spy, observer) = tracking("# A\n# B\n", &[anchor("a", 0.0), anchor("b", 50.0)]);
        spy.teardown();
        assert_eq!(spy.state(), SpyState::TornDown);
        let changed = spy.observe(observer.registration(), &[entry("b", 5.0, true)]);
        assert!(!changed);
        assert_eq!(spy.active_id(), Some("a"));
    }

    #[test]
    fn stale_registration_ignored_after_document_switch() {
        let (mut spy, old) = tracking("# A\n# B\n", &[anchor("a", 0.0), anchor("b", 50.0)]);

        spy.reset();
        assert_eq!(spy.state(), SpyState::Uninitialized);
        assert_eq!(spy.active_id(), None);

        let new = spy
            .attach(&extract("# X\n# B\n"), &[anchor("x", 0.0), anchor("b", 30.0)])
            .expect("new sequence resolves");
        assert_ne!(old.registration(), new.registration());
        assert_eq!(spy.active_id(), Some("x"));

        // A late batch from the previous document names an id that also
        // exists in the new one; it must not apply.
        assert!(!spy.observe(old.registration(), &[entry("b", 1.0, true)]));
        assert_eq!(spy.active_id(), Some("x"));

        assert!(spy.observe(new.registration(), &[entry("b", 1.0, true)]));
        assert_eq!(spy.active_id(), Some("b"));
    }

    #[test]
    fn attach_twice_without_reset_is_ignored() {
        let (mut spy, _observer) = tracking("# A\n", &[anchor("a", 0.0)]);
        assert!(spy.attach(&extract("# A\n"), &[anchor("a", 0.0)]).is_none());
        assert_eq!(spy.state(), SpyState::Tracking);
    }

    #[test]
    fn teardown_is_idempotent() {
        let (mut spy, _observer) = tracking("# A\n", &[anchor("a", 0.0)]);
        spy.teardown();
        spy.teardown();
        assert_eq!(spy.state(), SpyState::TornDown);
    }

    // --- BandObserver ---

    #[test]
    fn first_scan_reports_every_target() {
        let (_spy, mut observer) = tracking(
            "# A\n# B\n# C\n",
            &[anchor("a", 0.0), anchor("b", 25.0), anchor("c", 80.0)],
        );
        let batch = observer.scan(0.0, 100.0);
        assert_eq!(batch.len(), 3);
        let hits: Vec<&str> = batch
            .iter()
            .filter(|e| e.intersecting)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(hits, vec!["b"]);
    }

    #[test]
    fn later_scans_report_only_changes() {
        let (_spy, mut observer) = tracking(
            "# A\n# B\n",
            &[anchor("a", 0.0), anchor("b", 25.0)],
        );
        observer.scan(0.0, 100.0);
        assert!(observer.scan(1.0, 100.0).is_empty());

        // Scrolling 10 rows moves "b" above the band.
        let batch = observer.scan(10.0, 100.0);
        assert_eq!(batch, vec![entry("b", 15.0, false)]);
    }

    #[test]
    fn scroll_drives_active_heading() {
        let (mut spy, mut observer) = tracking(
            "# A\n## B\n## C\n",
            &[anchor("a", 0.0), anchor("b", 60.0), anchor("c", 120.0)],
        );
        let reg = observer.registration();

        spy.observe(reg, &observer.scan(0.0, 100.0));
        assert_eq!(spy.active_id(), Some("a"));

        spy.observe(reg, &observer.scan(35.0, 100.0));
        assert_eq!(spy.active_id(), Some("b"));

        // Between headings: nothing in the band, "b" stays active.
        spy.observe(reg, &observer.scan(60.0, 100.0));
        assert_eq!(spy.active_id(), Some("b"));

        spy.observe(reg, &observer.scan(95.0, 100.0));
        assert_eq!(spy.active_id(), Some("c"));

        spy.observe(reg, &observer.scan(0.0, 100.0));
        assert_eq!(spy.active_id(), Some("c"), "a is above the band at offset 0");
    }
}
