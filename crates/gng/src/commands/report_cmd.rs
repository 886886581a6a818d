//! `gng report` -- matrix, graph, and dashboard views in JSON or HTML.

use std::str::FromStr;

use anyhow::Result;

use gonogo_core::enums::{StoryStatus, TestPriority};
use gonogo_report::{MatrixFilter, QueryEngine};

use crate::cli::{ReportArgs, ReportFormat, ReportView};
use crate::context::RuntimeContext;
use crate::html;
use crate::output;

pub fn run(ctx: &RuntimeContext, args: &ReportArgs) -> Result<i32> {
    let (store, config) = ctx.open()?;
    let engine = QueryEngine::new(&store, &config);

    let mut incomplete = false;
    match args.view {
        ReportView::Matrix => {
            let status = args
                .status
                .as_deref()
                .map(StoryStatus::from_str)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            let priority = args
                .priority
                .as_deref()
                .map(TestPriority::from_str)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            let filter = MatrixFilter {
                epic: args.epic.clone(),
                capability: args.capability.clone(),
                component: args.component.clone(),
                status,
                priority,
            };
            let view = engine.matrix(&filter)?;
            incomplete = view.incomplete;
            match args.format {
                ReportFormat::Json => output::print_json(&view)?,
                ReportFormat::Html => print!("{}", html::render_matrix(&view)),
            }
        }
        ReportView::Graph => match (args.format, &args.target) {
            (ReportFormat::Json, Some(target)) => {
                output::print_json(&engine.critical_path_to(target)?)?;
            }
            (ReportFormat::Json, None) => {
                output::print_json(&engine.dependency_graph(None)?)?;
            }
            (ReportFormat::Html, _) => {
                print!("{}", html::render_graph(&engine.dependency_graph(None)?));
            }
        },
        ReportView::Pm => {
            let view = engine.pm_view()?;
            incomplete = view.incomplete;
            match args.format {
                ReportFormat::Json => output::print_json(&view)?,
                ReportFormat::Html => print!("{}", html::render_pm(&view)),
            }
        }
        ReportView::Po => {
            let view = engine.po_view()?;
            incomplete = view.incomplete;
            match args.format {
                ReportFormat::Json => output::print_json(&view)?,
                ReportFormat::Html => print!("{}", html::render_po(&view)),
            }
        }
        ReportView::Qa => {
            let view = engine.qa_view()?;
            incomplete = view.incomplete;
            match args.format {
                ReportFormat::Json => output::print_json(&view)?,
                ReportFormat::Html => print!("{}", html::render_qa(&view)),
            }
        }
    }

    // Partial results are usable but flagged.
    Ok(if incomplete { 1 } else { 0 })
}
