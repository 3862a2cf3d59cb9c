// src/coverage/lcov.rs

//! LCOV tracefile adapter. Only `SF`, `DA` and `end_of_record` matter here.

use super::{CoverageFragment, CoverageReport, FragmentLine};

pub fn parse(content: &str) -> CoverageReport {
    let mut report = CoverageReport::default();
    let mut current: Option<CoverageFragment> = None;

    for line in content.lines().map(str::trim) {
        if let Some(path) = line.strip_prefix("SF:") {
            if let Some(done) = current.replace(CoverageFragment::new(path.trim())) {
                report.fragments.push(done);
            }
        } else if let Some(data) = line.strip_prefix("DA:") {
            if let Some(fragment) = current.as_mut() {
                // DA:<line>,<hits>[,<checksum>]
                let mut parts = data.split(',');
                let number = parts.next().and_then(|n| n.trim().parse::<i64>().ok()).unwrap_or(0);
                // some generators emit negative or fractional hit counts
                let hits = parts
                    .next()
                    .and_then(|h| h.trim().parse::<f64>().ok())
                    .map_or(0, |h| if h > 0.0 { h.ceil() as u64 } else { 0 });
                fragment.push(FragmentLine::from_hits(number, hits));
            }
        } else if line == "end_of_record" {
            if let Some(done) = current.take() {
                report.fragments.push(done);
            }
        }
    }

    if let Some(done) = current.take() {
        report.fragments.push(done);
    }
    report
}
