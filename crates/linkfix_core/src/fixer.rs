//! The sweep itself: walk stored external links, probe archive snapshots'
//! original URLs, and rewrite pages whose links came back to life.

use anyhow::Result;
use similar::TextDiff;

use crate::archive::match_archive_url;
use crate::config::{DEFAULT_AUTHOR, DEFAULT_EDIT_SUMMARY};
use crate::ledger::{FixLedger, LedgerEntry, content_hash};
use crate::probe::{UrlProbe, is_dead_status};
use crate::store::{ContentStore, LinkRecord, PageDocument, SaveOptions, redirect_target};

#[derive(Debug, Clone)]
pub struct FixOptions {
    /// Number of leading link rows to skip (resume semantics).
    pub offset: usize,
    /// Restrict matching to snapshots from this year; empty means any year.
    pub year: String,
    /// Report and diff would-be edits without saving anything.
    pub dry_run: bool,
    pub save: SaveOptions,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            year: String::new(),
            dry_run: false,
            save: SaveOptions {
                summary: DEFAULT_EDIT_SUMMARY.to_string(),
                author: DEFAULT_AUTHOR.to_string(),
                suppress_recent_changes: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    StillDead,
    TitleMissing,
    RedirectTargetMissing,
    UrlNotInText,
    Fixed,
    WouldFix,
}

impl RecordOutcome {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::StillDead => " .. still dead",
            Self::TitleMissing => " .. title does not exist",
            Self::RedirectTargetMissing => " .. redirect target does not exist",
            Self::UrlNotInText => " .. URL not found in the wikitext",
            Self::Fixed => " .. fixed!",
            Self::WouldFix => " .. would fix (dry-run)",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::StillDead => "still dead",
            Self::TitleMissing => "title does not exist",
            Self::RedirectTargetMissing => "redirect target does not exist",
            Self::UrlNotInText => "url not found in the wikitext",
            Self::Fixed => "fixed",
            Self::WouldFix => "would fix",
        }
    }
}

/// One processed matching record, as reported back to the caller.
#[derive(Debug, Clone)]
pub struct SweepRecord {
    pub index: usize,
    pub page_id: i64,
    pub archived_url: String,
    pub recovered_url: String,
    pub http_status: u16,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Rows inspected past the offset, matching or not.
    pub scanned: usize,
    /// Rows that matched the archive-snapshot pattern.
    pub matched: usize,
    pub fixed: usize,
    pub records: Vec<SweepRecord>,
}

/// Run the sweep over `records` in order. Every matching record is probed
/// and either skipped with a logged reason or rewritten in place; no branch
/// aborts the scan. Only content-store and ledger failures propagate.
pub fn run_sweep(
    records: &[LinkRecord],
    store: &mut dyn ContentStore,
    probe: &mut dyn UrlProbe,
    mut ledger: Option<&mut FixLedger>,
    options: &FixOptions,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for (index, record) in records.iter().enumerate() {
        if index < options.offset {
            continue;
        }
        report.scanned += 1;

        let matched = match match_archive_url(&record.target_url, &options.year) {
            Some(matched) => matched,
            None => continue,
        };
        report.matched += 1;

        let status = probe.probe(&matched.recovered_url);
        let (outcome, edit) = match process_record(store, record, &matched.recovered_url, status)? {
            Processed::Skip(outcome) => (outcome, None),
            Processed::Edit { page, new_text } => {
                if options.dry_run {
                    (RecordOutcome::WouldFix, Some((page, new_text)))
                } else {
                    store.save_text(&page, &new_text, &options.save)?;
                    report.fixed += 1;
                    (RecordOutcome::Fixed, Some((page, new_text)))
                }
            }
        };
        println!(
            "{}",
            format_record_line(index, &matched.recovered_url, status, outcome)
        );
        if outcome == RecordOutcome::WouldFix
            && let Some((page, new_text)) = &edit
        {
            print_diff(&page.text, new_text);
        }

        if let Some(ledger) = ledger.as_deref_mut() {
            ledger.record(&LedgerEntry {
                row_index: index,
                page_id: record.page_id,
                archived_url: record.target_url.clone(),
                recovered_url: matched.recovered_url.clone(),
                http_status: status,
                outcome: outcome.label().to_string(),
                content_hash: edit
                    .as_ref()
                    .filter(|_| outcome == RecordOutcome::Fixed)
                    .map(|(_, new_text)| content_hash(new_text)),
            })?;
            // A previewed row is not a processed row: advancing the
            // checkpoint here would make a later --resume skip every fix
            // the operator just previewed.
            if !options.dry_run {
                ledger.set_checkpoint(index + 1)?;
            }
        }

        report.records.push(SweepRecord {
            index,
            page_id: record.page_id,
            archived_url: record.target_url.clone(),
            recovered_url: matched.recovered_url,
            http_status: status,
            outcome,
        });
    }

    Ok(report)
}

enum Processed {
    Skip(RecordOutcome),
    Edit {
        page: PageDocument,
        new_text: String,
    },
}

/// The per-record branch sequence. Resolves the owning page (following one
/// redirect hop to its target, never editing the stub) and prepares the
/// rewritten text; every anomaly is a skip outcome, not an error.
fn process_record(
    store: &mut dyn ContentStore,
    record: &LinkRecord,
    recovered_url: &str,
    status: u16,
) -> Result<Processed> {
    if is_dead_status(status) {
        return Ok(Processed::Skip(RecordOutcome::StillDead));
    }

    let page = match store.page_by_id(record.page_id)? {
        Some(page) => page,
        None => return Ok(Processed::Skip(RecordOutcome::TitleMissing)),
    };
    let page = if page.is_redirect {
        let resolved = match redirect_target(&page.text) {
            Some(target) => store.page_by_title(&target)?,
            None => None,
        };
        match resolved {
            Some(target_page) => target_page,
            None => return Ok(Processed::Skip(RecordOutcome::RedirectTargetMissing)),
        }
    } else {
        page
    };

    // The stored link row can be stale relative to the page's current text.
    if !page.text.contains(&record.target_url) {
        return Ok(Processed::Skip(RecordOutcome::UrlNotInText));
    }

    let new_text = page.text.replace(&record.target_url, recovered_url);
    Ok(Processed::Edit { page, new_text })
}

pub fn format_record_line(
    index: usize,
    recovered_url: &str,
    status: u16,
    outcome: RecordOutcome,
) -> String {
    format!("{index} {recovered_url} {status}{}", outcome.suffix())
}

fn print_diff(old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    let unified = diff
        .unified_diff()
        .context_radius(1)
        .header("current", "proposed")
        .to_string();
    for line in unified.lines() {
        println!("    {line}");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::{FixOptions, RecordOutcome, format_record_line, run_sweep};
    use crate::ledger::FixLedger;
    use crate::probe::UrlProbe;
    use crate::store::{ContentStore, LinkRecord, PageDocument, SaveOptions};

    const ARCHIVED: &str = "http://web.archive.org/web/20150101000000/http://example.com/x";
    const RECOVERED: &str = "http://example.com/x";

    struct RecordedSave {
        page_id: i64,
        text: String,
        summary: String,
        author: String,
    }

    #[derive(Default)]
    struct MockStore {
        pages: Vec<PageDocument>,
        saves: Vec<RecordedSave>,
    }

    impl MockStore {
        fn with_page(mut self, page: PageDocument) -> Self {
            self.pages.push(page);
            self
        }

        fn page(id: i64, title: &str, text: &str) -> PageDocument {
            PageDocument {
                page_id: id,
                title: title.to_string(),
                is_redirect: text.trim_start().starts_with("#REDIRECT"),
                text: text.to_string(),
            }
        }
    }

    impl ContentStore for MockStore {
        fn page_by_id(&mut self, page_id: i64) -> anyhow::Result<Option<PageDocument>> {
            Ok(self
                .pages
                .iter()
                .find(|page| page.page_id == page_id)
                .cloned())
        }

        fn page_by_title(&mut self, title: &str) -> anyhow::Result<Option<PageDocument>> {
            Ok(self.pages.iter().find(|page| page.title == title).cloned())
        }

        fn save_text(
            &mut self,
            page: &PageDocument,
            text: &str,
            options: &SaveOptions,
        ) -> anyhow::Result<()> {
            let stored = self
                .pages
                .iter_mut()
                .find(|stored| stored.page_id == page.page_id)
                .expect("saving unknown page");
            stored.text = text.to_string();
            self.saves.push(RecordedSave {
                page_id: page.page_id,
                text: text.to_string(),
                summary: options.summary.clone(),
                author: options.author.clone(),
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedProbe {
        statuses: BTreeMap<String, u16>,
        probed: Vec<String>,
    }

    impl ScriptedProbe {
        fn with_status(mut self, url: &str, status: u16) -> Self {
            self.statuses.insert(url.to_string(), status);
            self
        }
    }

    impl UrlProbe for ScriptedProbe {
        fn probe(&mut self, url: &str) -> u16 {
            self.probed.push(url.to_string());
            self.statuses.get(url).copied().unwrap_or(0)
        }
    }

    fn archived_record(page_id: i64) -> LinkRecord {
        LinkRecord {
            page_id,
            target_url: ARCHIVED.to_string(),
        }
    }

    #[test]
    fn fixes_live_link_in_place() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            &format!("See {ARCHIVED} for details."),
        ));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(report.fixed, 1);
        assert_eq!(report.records[0].outcome, RecordOutcome::Fixed);
        assert_eq!(store.saves.len(), 1);
        let save = &store.saves[0];
        assert_eq!(save.page_id, 42);
        assert_eq!(save.text, "See http://example.com/x for details.");
        assert_eq!(save.summary, "Replace archived link for live version");
        assert_eq!(save.author, "Archived links script");
    }

    #[test]
    fn dead_statuses_skip_without_mutation() {
        for status in [0u16, 403, 404, 410] {
            let records = vec![archived_record(42)];
            let mut store = MockStore::default().with_page(MockStore::page(
                42,
                "Alpha",
                &format!("See {ARCHIVED}."),
            ));
            let mut probe = ScriptedProbe::default().with_status(RECOVERED, status);

            let report = run_sweep(
                &records,
                &mut store,
                &mut probe,
                None,
                &FixOptions::default(),
            )
            .expect("sweep");

            assert_eq!(report.records[0].outcome, RecordOutcome::StillDead);
            assert_eq!(report.records[0].http_status, status);
            assert!(store.saves.is_empty());
        }
    }

    #[test]
    fn offset_skips_leading_rows_entirely() {
        let records: Vec<_> = (0..6)
            .map(|row| LinkRecord {
                page_id: row,
                target_url: format!(
                    "http://web.archive.org/web/20150101000000/http://example.com/{row}"
                ),
            })
            .collect();
        let mut store = MockStore::default();
        let mut probe = ScriptedProbe::default();

        let options = FixOptions {
            offset: 5,
            ..FixOptions::default()
        };
        let report = run_sweep(&records, &mut store, &mut probe, None, &options).expect("sweep");

        assert_eq!(report.scanned, 1);
        assert_eq!(probe.probed, vec!["http://example.com/5".to_string()]);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].index, 5);
    }

    #[test]
    fn year_restriction_skips_other_snapshots() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default();
        let mut probe = ScriptedProbe::default();

        let options = FixOptions {
            year: "2011".to_string(),
            ..FixOptions::default()
        };
        let report = run_sweep(&records, &mut store, &mut probe, None, &options).expect("sweep");

        assert_eq!(report.matched, 0);
        assert!(probe.probed.is_empty());
        assert!(report.records.is_empty());
    }

    #[test]
    fn non_archive_links_are_skipped_silently() {
        let records = vec![LinkRecord {
            page_id: 42,
            target_url: "http://example.com/plain".to_string(),
        }];
        let mut store = MockStore::default();
        let mut probe = ScriptedProbe::default();

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(report.scanned, 1);
        assert_eq!(report.matched, 0);
        assert!(probe.probed.is_empty());
    }

    #[test]
    fn missing_page_is_a_logged_skip() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default();
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(report.records[0].outcome, RecordOutcome::TitleMissing);
        assert!(store.saves.is_empty());
    }

    #[test]
    fn redirect_fix_lands_on_the_target_page() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default()
            .with_page(MockStore::page(42, "Alpha", "#REDIRECT [[Beta]]"))
            .with_page(MockStore::page(99, "Beta", &format!("Link: {ARCHIVED}")));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(report.records[0].outcome, RecordOutcome::Fixed);
        assert_eq!(store.saves.len(), 1);
        assert_eq!(store.saves[0].page_id, 99);
        assert_eq!(store.saves[0].text, format!("Link: {RECOVERED}"));
        // The redirect stub itself is untouched.
        let stub = store.pages.iter().find(|page| page.page_id == 42).unwrap();
        assert_eq!(stub.text, "#REDIRECT [[Beta]]");
    }

    #[test]
    fn missing_redirect_target_skips_without_touching_the_stub() {
        let records = vec![archived_record(42)];
        let mut store =
            MockStore::default().with_page(MockStore::page(42, "Alpha", "#REDIRECT [[Gone]]"));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(
            report.records[0].outcome,
            RecordOutcome::RedirectTargetMissing
        );
        assert!(store.saves.is_empty());
    }

    #[test]
    fn stale_link_row_is_a_logged_skip() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            "The link was already removed from this text.",
        ));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let report = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("sweep");

        assert_eq!(report.records[0].outcome, RecordOutcome::UrlNotInText);
        assert!(store.saves.is_empty());
    }

    #[test]
    fn second_sweep_is_idempotent() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            &format!("See {ARCHIVED} for details."),
        ));

        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);
        let first = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("first sweep");
        assert_eq!(first.fixed, 1);

        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);
        let second = run_sweep(
            &records,
            &mut store,
            &mut probe,
            None,
            &FixOptions::default(),
        )
        .expect("second sweep");

        assert_eq!(second.fixed, 0);
        assert_eq!(second.records[0].outcome, RecordOutcome::UrlNotInText);
        assert_eq!(store.saves.len(), 1);
    }

    #[test]
    fn dry_run_reports_without_saving() {
        let records = vec![archived_record(42)];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            &format!("See {ARCHIVED}."),
        ));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let options = FixOptions {
            dry_run: true,
            ..FixOptions::default()
        };
        let report = run_sweep(&records, &mut store, &mut probe, None, &options).expect("sweep");

        assert_eq!(report.fixed, 0);
        assert_eq!(report.records[0].outcome, RecordOutcome::WouldFix);
        assert!(store.saves.is_empty());
    }

    #[test]
    fn ledger_records_outcomes_and_advances_checkpoint() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = FixLedger::open(&temp.path().join("linkfix.db")).expect("ledger");

        let records = vec![
            archived_record(42),
            LinkRecord {
                page_id: 7,
                target_url: "http://example.com/plain".to_string(),
            },
            LinkRecord {
                page_id: 8,
                target_url: "http://web.archive.org/web/20150101000000/http://dead.example/y"
                    .to_string(),
            },
        ];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            &format!("See {ARCHIVED}."),
        ));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        run_sweep(
            &records,
            &mut store,
            &mut probe,
            Some(&mut ledger),
            &FixOptions::default(),
        )
        .expect("sweep");

        let summary = ledger.summary().expect("summary");
        // Only the two matching rows are recorded.
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.fixed, 1);
        assert!(summary.by_outcome.contains(&("still dead".to_string(), 1)));
        assert_eq!(summary.checkpoint, Some(3));
    }

    #[test]
    fn dry_run_leaves_the_resume_checkpoint_alone() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = FixLedger::open(&temp.path().join("linkfix.db")).expect("ledger");

        let records = vec![archived_record(42)];
        let mut store = MockStore::default().with_page(MockStore::page(
            42,
            "Alpha",
            &format!("See {ARCHIVED}."),
        ));
        let mut probe = ScriptedProbe::default().with_status(RECOVERED, 200);

        let options = FixOptions {
            dry_run: true,
            ..FixOptions::default()
        };
        let report = run_sweep(&records, &mut store, &mut probe, Some(&mut ledger), &options)
            .expect("sweep");

        assert_eq!(report.fixed, 0);
        assert!(store.saves.is_empty());
        // A resumed real sweep must still start at row 0 and apply the fix.
        assert_eq!(ledger.checkpoint().expect("checkpoint"), None);
        let summary = ledger.summary().expect("summary");
        assert_eq!(summary.total_records, 1);
        assert!(summary.by_outcome.contains(&("would fix".to_string(), 1)));
    }

    #[test]
    fn record_lines_match_the_maintenance_output_format() {
        assert_eq!(
            format_record_line(12, RECOVERED, 200, RecordOutcome::Fixed),
            "12 http://example.com/x 200 .. fixed!"
        );
        assert_eq!(
            format_record_line(3, RECOVERED, 404, RecordOutcome::StillDead),
            "3 http://example.com/x 404 .. still dead"
        );
        assert_eq!(
            format_record_line(5, RECOVERED, 200, RecordOutcome::TitleMissing),
            "5 http://example.com/x 200 .. title does not exist"
        );
        assert_eq!(
            format_record_line(6, RECOVERED, 200, RecordOutcome::RedirectTargetMissing),
            "6 http://example.com/x 200 .. redirect target does not exist"
        );
        assert_eq!(
            format_record_line(7, RECOVERED, 200, RecordOutcome::UrlNotInText),
            "7 http://example.com/x 200 .. URL not found in the wikitext"
        );
    }
}
