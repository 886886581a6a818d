//! Minimal HTML rendering for `gng report --format html`.
//!
//! The engine emits structured view-models; this module is the thin
//! renderer collaborator, kept in the CLI on purpose.

use gonogo_report::viewmodel::{DependencyGraphView, MatrixView, PmView, PoView, QaView};

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{}\n</body></html>\n",
        escape(title),
        escape(title),
        body
    )
}

pub fn render_matrix(view: &MatrixView) -> String {
    let mut rows = String::new();
    for row in &view.rows {
        let tests: Vec<String> = row
            .tests
            .iter()
            .map(|t| {
                let status = t
                    .last_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "never run".to_string());
                format!("{} ({status})", escape(&t.test_id))
            })
            .collect();
        let defects: Vec<String> = row
            .defects
            .iter()
            .map(|d| format!("{} ({}/{})", escape(&d.defect_id), d.severity, d.status))
            .collect();
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&row.user_story_id),
            escape(&row.title),
            row.status,
            row.story_points,
            row.epic_id.as_deref().map(escape).unwrap_or_default(),
            tests.join("<br>"),
            if row.coverage_flag {
                "uncovered".to_string()
            } else {
                defects.join("<br>")
            },
        ));
    }
    let table = format!(
        "<table border=\"1\">\n<tr><th>Story</th><th>Title</th><th>Status</th><th>Points</th><th>Epic</th><th>Tests</th><th>Defects</th></tr>\n{rows}</table>"
    );
    let banner = if view.incomplete {
        "<p><em>Partial result: query deadline expired.</em></p>"
    } else {
        ""
    };
    page("Requirements Matrix", &format!("{banner}{table}"))
}

pub fn render_graph(view: &DependencyGraphView) -> String {
    let mut body = String::from("<h2>Edges</h2>\n<ul>\n");
    for edge in &view.edges {
        body.push_str(&format!(
            "<li>{} &rarr; {} ({})</li>\n",
            escape(&edge.from),
            escape(&edge.to),
            edge.kind
        ));
    }
    body.push_str("</ul>\n");
    if !view.cycles.is_empty() {
        body.push_str("<h2>Cycles</h2>\n<ul>\n");
        for cycle in &view.cycles {
            body.push_str(&format!("<li>{}</li>\n", escape(&cycle.join(" , "))));
        }
        body.push_str("</ul>\n");
    }
    page("Epic Dependency Graph", &body)
}

pub fn render_pm(view: &PmView) -> String {
    let mut body = String::from("<h2>Epics</h2>\n<ul>\n");
    for epic in &view.epics {
        body.push_str(&format!(
            "<li>{} {} ({}/{} points done{})</li>\n",
            escape(&epic.epic_id),
            escape(&epic.title),
            epic.completion.numerator,
            epic.completion.denominator,
            epic.schedule_variance_days
                .map(|d| format!(", variance {d}d"))
                .unwrap_or_default(),
        ));
    }
    body.push_str("</ul>\n<h2>Risks</h2>\n<ul>\n");
    for risk in &view.risks {
        body.push_str(&format!(
            "<li>{}: {}</li>\n",
            escape(&risk.epic_id),
            escape(&risk.reason)
        ));
    }
    body.push_str("</ul>\n");
    page("PM Dashboard", &body)
}

pub fn render_po(view: &PoView) -> String {
    let mut body = String::from("<ul>\n");
    for epic in &view.epics {
        body.push_str(&format!(
            "<li>{} {}: roi {}, adoption {}</li>\n",
            escape(&epic.epic_id),
            escape(&epic.title),
            epic.roi.map(|r| format!("{r:.2}")).unwrap_or_else(|| "n/a".into()),
            epic.adoption_metric
                .map(|a| format!("{a:.2}"))
                .unwrap_or_else(|| "n/a".into()),
        ));
    }
    body.push_str("</ul>\n");
    page("PO Dashboard", &body)
}

pub fn render_qa(view: &QaView) -> String {
    let mut body = String::from("<ul>\n");
    for epic in &view.epics {
        body.push_str(&format!(
            "<li>{} {}: coverage {}/{}, pass rate {}, density {:.2}, debt {:.1}</li>\n",
            escape(&epic.epic_id),
            escape(&epic.title),
            epic.coverage.covered_stories,
            epic.coverage.total_stories,
            epic.pass_rate
                .rate()
                .map(|r| format!("{:.0}%", r * 100.0))
                .unwrap_or_else(|| "n/a".into()),
            epic.defect_density,
            epic.tech_debt_score,
        ));
    }
    body.push_str("</ul>\n");
    page("QA Dashboard", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<b>&"), "&lt;b&gt;&amp;");
    }

    #[test]
    fn matrix_page_contains_rows() {
        let view = MatrixView::default();
        let html = render_matrix(&view);
        assert!(html.contains("<table"));
        assert!(html.contains("Requirements Matrix"));
    }
}
