//! The annotation session: all state that lives between triggering events.
//!
//! The host owns one [`AnnotationSession`] per page and drives it from three
//! places:
//!
//! 1. a page event (navigation, content mutation) calls
//!    [`AnnotationSession::on_page_event`] or [`AnnotationSession::begin_request`],
//!    which opens a new epoch and hands back the stamped request to resolve;
//! 2. whenever a resolver answers, in whatever order, the host passes the
//!    stamp and envelope to [`AnnotationSession::receive`];
//! 3. on every frame while [`SliceOutcome::has_more`] says so, the host calls
//!    [`AnnotationSession::tick`].
//!
//! Everything runs on the host's thread. Work from superseded epochs is
//! dropped, never synchronized.

use std::time::Instant;

use crate::applier::{Annotation, annotate};
use crate::dom::{Document, NodeId};
use crate::epoch::{Epoch, EpochTracker};
use crate::locator::{FileCache, diff_cell, line_element};
use crate::page::classify_page;
use crate::request::{ResolveRequest, StampedRequest};
use crate::resolver::Resolver;
use crate::scheduler::{BatchScheduler, PendingUnit, SliceOutcome};
use crate::symbols::{Envelope, EnvelopeError, ResolutionResult, Symbol};

/// What happened to a resolver response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Issued before the current epoch; dropped untouched
    Stale,
    /// The resolver reported an error
    Failed(String),
    /// Neither a result nor an error
    Invalid,
    /// Single-file result applied in place
    Applied(ApplyReport),
    /// Diff result queued for [`AnnotationSession::tick`]
    Scheduled { units: usize },
}

/// Tally of one pass over a symbol list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub annotated: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Timing {
    request_started: Option<Instant>,
    batch_started: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct AnnotationSession {
    epochs: EpochTracker,
    scheduler: BatchScheduler,
    files: FileCache,
    timing: Timing,
}

impl AnnotationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> Epoch {
        self.epochs.current()
    }

    /// Units still waiting for a tick
    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    /// Discard everything gathered for earlier epochs: queued diff units and
    /// cached file lookups.
    pub fn reset(&mut self, epoch: Epoch) {
        log::debug!(
            "[xrefmark] Starting epoch {epoch}, dropping {} pending units",
            self.scheduler.len()
        );
        self.scheduler.clear();
        self.files.clear();
        self.timing.request_started = Some(Instant::now());
    }

    /// Open a new epoch for `request` and return it stamped
    pub fn begin_request(&mut self, request: ResolveRequest) -> StampedRequest {
        let epoch = self.epochs.advance();
        self.reset(epoch);
        let stamped = StampedRequest { epoch, request };
        log::info!("[xrefmark] Resolving reference for: {stamped:?}");
        stamped
    }

    /// Classify the page and, when it is one we annotate, open a new epoch
    pub fn on_page_event(&mut self, doc: &Document) -> Option<StampedRequest> {
        let request = classify_page(doc)?;
        Some(self.begin_request(request))
    }

    /// Resolve synchronously and apply the answer: `begin_request` followed
    /// by `receive`.
    pub fn resolve_and_receive(
        &mut self,
        doc: &mut Document,
        resolver: &impl Resolver,
        request: ResolveRequest,
    ) -> ReceiveOutcome {
        let stamped = self.begin_request(request);
        let envelope = resolver.resolve(&stamped.request);
        self.receive(doc, stamped.epoch, envelope)
    }

    /// Handle the response to the request stamped with `epoch`
    pub fn receive(
        &mut self,
        doc: &mut Document,
        epoch: Epoch,
        envelope: Envelope,
    ) -> ReceiveOutcome {
        if let Some(started) = self.timing.request_started {
            log::info!(
                "[xrefmark] Received server response in: {}ms",
                started.elapsed().as_millis()
            );
        }

        if !self.epochs.is_current(epoch) {
            log::debug!(
                "[xrefmark] Ignoring outdated server response for epoch {epoch} (current {})",
                self.epochs.current()
            );
            return ReceiveOutcome::Stale;
        }

        match envelope.into_result() {
            Err(EnvelopeError::Remote(message)) => {
                log::warn!("[xrefmark] ERROR {message}");
                ReceiveOutcome::Failed(message)
            }
            Err(EnvelopeError::Invalid) => {
                log::error!("[xrefmark] ERROR Invalid response: no result and no error");
                ReceiveOutcome::Invalid
            }
            Ok(ResolutionResult::File(list)) => {
                log::info!("[xrefmark] Resolved {} symbols", list.syms.len());
                ReceiveOutcome::Applied(annotate_lines(doc, epoch, &list.syms))
            }
            Ok(ResolutionResult::Diff(diff)) => {
                log::info!(
                    "[xrefmark] Resolved {} new files and {} old ones",
                    diff.new_files.len(),
                    diff.old_files.len()
                );
                let units = self.scheduler.schedule_diff(epoch, &diff);
                if units > 0 {
                    self.timing.batch_started = Some(Instant::now());
                }
                ReceiveOutcome::Scheduled { units }
            }
        }
    }

    /// Process one slice of queued diff units
    pub fn tick(&mut self, doc: &mut Document) -> SliceOutcome {
        let current = self.epochs.current();
        let Self { scheduler, files, .. } = &mut *self;
        let outcome = scheduler.run_slice(|unit| {
            render_unit(doc, files, current, &unit);
        });

        match outcome {
            SliceOutcome::Completed { .. } => {
                if let Some(started) = self.timing.batch_started.take() {
                    log::info!(
                        "[xrefmark] Augmenting completed in: {}ms",
                        started.elapsed().as_millis()
                    );
                }
                if let Some(started) = self.timing.request_started {
                    log::info!(
                        "[xrefmark] End-to-end time: {}ms",
                        started.elapsed().as_millis()
                    );
                }
            }
            SliceOutcome::Interrupted { .. } => {
                log::info!("[xrefmark] Augmenting interrupted by new request");
            }
            SliceOutcome::Idle | SliceOutcome::MorePending { .. } => {}
        }
        outcome
    }

    /// Tick until the scheduler has nothing left; returns the number of ticks
    pub fn run_to_idle(&mut self, doc: &mut Document) -> usize {
        let mut ticks = 0;
        loop {
            let outcome = self.tick(doc);
            if outcome == SliceOutcome::Idle {
                return ticks;
            }
            ticks += 1;
            if !outcome.has_more() {
                return ticks;
            }
        }
    }
}

/// Apply single-file symbols to the `LC{line}` elements of `doc`.
///
/// Multi-line symbols and lines missing from the page are skipped.
pub fn annotate_lines(doc: &mut Document, epoch: Epoch, symbols: &[Symbol]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for symbol in symbols {
        let target = symbol.line().and_then(|line| line_element(doc, line));
        let applied = match target {
            Some(element) => apply_symbol(doc, element, epoch, symbol),
            None => false,
        };
        if applied {
            report.annotated += 1;
        } else {
            report.skipped += 1;
        }
    }
    report
}

fn render_unit(doc: &mut Document, files: &mut FileCache, current: Epoch, unit: &PendingUnit) {
    if unit.epoch != current {
        return;
    }
    let Some(line) = unit.symbol.line() else {
        return;
    };
    let Some(file) = files.get_or_locate(doc, &unit.path) else {
        return;
    };
    let Some(cell) = diff_cell(doc, file, unit.side, line) else {
        return;
    };
    apply_symbol(doc, cell, unit.epoch, &unit.symbol);
}

fn apply_symbol(doc: &mut Document, container: NodeId, epoch: Epoch, symbol: &Symbol) -> bool {
    let annotation = Annotation {
        range: symbol.range(),
        url: &symbol.url,
        epoch,
    };
    match annotate(doc, container, 0, &annotation) {
        Ok(_) => true,
        Err(err) => {
            log::error!("[xrefmark] Failed to annotate {symbol:?}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{DiffSymbols, FileSymbols, SymbolList};
    use crate::views::{DiffFile, blob_view, split_diff_view};
    use pretty_assertions::assert_eq;

    fn blob_request() -> ResolveRequest {
        ResolveRequest::Blob {
            slug: "o/r".to_string(),
            commit: "c".to_string(),
            path: "main.go".to_string(),
        }
    }

    fn file_result(symbols: Vec<Symbol>) -> Envelope {
        Envelope::ok(ResolutionResult::File(SymbolList { syms: symbols }))
    }

    #[test]
    fn applies_single_file_results_immediately() {
        let mut doc = blob_view("package main\nfunc main() {}\n");
        let mut session = AnnotationSession::new();
        let stamped = session.begin_request(blob_request());

        let outcome = session.receive(
            &mut doc,
            stamped.epoch,
            file_result(vec![
                Symbol::new(2, 5..9, "https://x/main"),
                Symbol::new(40, 0..1, "https://x/missing"),
            ]),
        );

        assert_eq!(
            outcome,
            ReceiveOutcome::Applied(ApplyReport {
                annotated: 1,
                skipped: 1
            })
        );
        let line = line_element(&doc, 2).unwrap();
        assert_eq!(
            doc.to_html(line),
            r#"<td id="LC2" class="blob-code blob-code-inner">func <a data-xref="1" href="https://x/main">main</a>() {}</td>"#
        );
    }

    #[test]
    fn stale_responses_touch_nothing() {
        let mut doc = blob_view("abc\n");
        let before = doc.to_html(doc.root());
        let mut session = AnnotationSession::new();
        let old = session.begin_request(blob_request());
        session.begin_request(blob_request());

        let outcome = session.receive(
            &mut doc,
            old.epoch,
            file_result(vec![Symbol::new(1, 0..3, "u")]),
        );

        assert_eq!(outcome, ReceiveOutcome::Stale);
        assert_eq!(doc.to_html(doc.root()), before);
    }

    #[test]
    fn error_and_invalid_envelopes_are_contained() {
        let mut doc = blob_view("abc\n");
        let mut session = AnnotationSession::new();
        let stamped = session.begin_request(blob_request());

        assert_eq!(
            session.receive(&mut doc, stamped.epoch, Envelope::err("500: boom")),
            ReceiveOutcome::Failed("500: boom".to_string())
        );
        assert_eq!(
            session.receive(&mut doc, stamped.epoch, Envelope::default()),
            ReceiveOutcome::Invalid
        );
    }

    #[test]
    fn multi_line_symbols_never_reach_the_tree() {
        let mut doc = blob_view("one\ntwo\n");
        let before = doc.to_html(doc.root());
        let mut symbol = Symbol::new(1, 0..2, "u");
        symbol.end_line = 2.into();

        let report = annotate_lines(&mut doc, Epoch(1), &[symbol]);

        assert_eq!(
            report,
            ApplyReport {
                annotated: 0,
                skipped: 1
            }
        );
        assert_eq!(doc.to_html(doc.root()), before);
    }

    #[test]
    fn diff_results_are_drained_by_ticks() {
        let mut doc = split_diff_view(&[DiffFile::new("a.go", "x := 1\n", "y := 2\n")]);
        let mut session = AnnotationSession::new();
        let stamped = session.begin_request(ResolveRequest::Pr {
            slug: "o/r".to_string(),
            id: "1".to_string(),
            base: "a".to_string(),
            old: "b".to_string(),
            new: "c".to_string(),
        });

        let outcome = session.receive(
            &mut doc,
            stamped.epoch,
            Envelope::ok(ResolutionResult::Diff(DiffSymbols {
                new_files: vec![FileSymbols {
                    path: "a.go".to_string(),
                    syms: vec![Symbol::new(1, 0..1, "new-y")],
                }],
                old_files: vec![FileSymbols {
                    path: "a.go".to_string(),
                    syms: vec![Symbol::new(1, 0..1, "old-x")],
                }],
            })),
        );
        assert_eq!(outcome, ReceiveOutcome::Scheduled { units: 2 });
        assert_eq!(session.pending(), 2);

        assert_eq!(
            session.tick(&mut doc),
            SliceOutcome::Completed { processed: 2 }
        );
        let links: Vec<_> = doc
            .descendants(doc.root())
            .filter_map(|n| doc.attr(n, "href").map(|href| (href, doc.text_content(n))))
            .collect();
        assert_eq!(
            links,
            vec![("old-x", "x".to_string()), ("new-y", "y".to_string())]
        );
        assert_eq!(session.tick(&mut doc), SliceOutcome::Idle);
    }

    #[test]
    fn run_to_idle_counts_ticks() {
        let mut doc = Document::new("div");
        let mut session = AnnotationSession::new();
        assert_eq!(session.run_to_idle(&mut doc), 0);

        let stamped = session.begin_request(blob_request());
        let syms = (0..130).map(|i| Symbol::new(1, i..i + 1, "u")).collect();
        session.receive(
            &mut doc,
            stamped.epoch,
            Envelope::ok(ResolutionResult::Diff(DiffSymbols {
                new_files: vec![FileSymbols {
                    path: "gone.go".to_string(),
                    syms,
                }],
                old_files: vec![],
            })),
        );

        assert_eq!(session.run_to_idle(&mut doc), 3);
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn page_events_open_epochs_only_for_known_pages() {
        let mut doc = Document::new("main");
        let mut session = AnnotationSession::new();
        assert_eq!(session.on_page_event(&doc), None);
        assert_eq!(session.epoch(), Epoch(0));

        let root = doc.root();
        doc.append_element(
            root,
            "a",
            [
                ("class", "js-permalink-shortcut".to_string()),
                ("href", "https://github.com/o/r/blob/c/main.go".to_string()),
            ],
        );
        let stamped = session.on_page_event(&doc).unwrap();

        assert_eq!(stamped.epoch, Epoch(1));
        assert_eq!(stamped.request, blob_request());
    }

    #[test]
    fn resolve_and_receive_uses_the_resolver() {
        let mut doc = blob_view("abcdefghij\n");
        let mut session = AnnotationSession::new();
        let resolver =
            |_: &ResolveRequest| file_result(vec![Symbol::new(1, 3..7, "https://x/y")]);

        let outcome = session.resolve_and_receive(&mut doc, &resolver, blob_request());

        assert_eq!(
            outcome,
            ReceiveOutcome::Applied(ApplyReport {
                annotated: 1,
                skipped: 0
            })
        );
    }
}
