use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use placename_rs::format::{self, SummaryView};
use placename_rs::paging::{PageReport, StepDirection, reconcile, resolve_page_size, step_page_size};
use placename_rs::{Detail, Record};
use serde_json::json;

fn bench_reconcile(c: &mut Criterion) {
    const CASES: &[(&str, PageReport)] = &[
        (
            "full_metadata",
            PageReport {
                total: Some(23),
                size: Some(10),
                pages: Some(3),
                current: Some(1),
            },
        ),
        (
            "derived_pages",
            PageReport {
                total: Some(12_345),
                size: None,
                pages: None,
                current: None,
            },
        ),
        (
            "empty",
            PageReport {
                total: Some(0),
                size: Some(10),
                pages: Some(4),
                current: Some(3),
            },
        ),
    ];
    for (label, report) in CASES {
        c.bench_with_input(BenchmarkId::new("reconcile", label), report, |b, report| {
            b.iter(|| black_box(reconcile(black_box(5), black_box(10), report)));
        });
    }
}

fn bench_page_size(c: &mut Criterion) {
    c.bench_function("step_page_size::sweep", |b| {
        b.iter(|| {
            let mut size = 1;
            for _ in 0..50 {
                size = step_page_size(size, StepDirection::Increase);
            }
            for _ in 0..50 {
                size = step_page_size(size, StepDirection::Decrease);
            }
            black_box(size)
        });
    });
    for raw in ["11", "25", "2.5", "abc"] {
        c.bench_with_input(BenchmarkId::new("resolve_page_size", raw), &raw, |b, &raw| {
            b.iter(|| black_box(resolve_page_size(10, raw, false)));
        });
    }
}

fn bench_formatting(c: &mut Criterion) {
    let detail = Detail::from_json(json!({
        "sysId": "PN-42",
        "nameVn": "交州",
        "spellings": [
            {"writtenForm": "交州", "script": "Hans"},
            {"writtenForm": "交州", "script": "Hant"},
            {"writtenForm": "Jiaozhou", "exonymLang": "pinyin"}
        ],
        "temporal": {"begYr": -111, "endYr": 544},
        "spatial": {"presentLocation": [{"textValue": "Hanoi"}, {"textValue": "Bac Ninh"}]},
        "sourceNote": "<p>Seat moved in&nbsp;<b>226</b>.</p>",
        "historicalContext": {"partOf": [{"sysId": "PN-1", "name": "Han", "begYr": -202, "endYr": 220}]}
    }))
    .expect("bench detail parses");
    let record: Record = detail.to_record();

    c.bench_function("format::summary_view", |b| {
        b.iter(|| black_box(SummaryView::build(&record, &detail)));
    });
    c.bench_function("format::source_note_text", |b| {
        b.iter(|| black_box(format::source_note_text(detail.source_note.as_deref())));
    });
    c.bench_function("format::location_summary", |b| {
        b.iter(|| black_box(format::location_summary(&record, Some(&detail))));
    });
}

criterion_group!(benches, bench_reconcile, bench_page_size, bench_formatting);
criterion_main!(benches);
