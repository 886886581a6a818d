//! `gng admin` -- health check and administrative writes.

use anyhow::{Context, Result};
use std::str::FromStr;

use gonogo_core::dependency::EpicDependency;
use gonogo_core::entity::Capability;
use gonogo_core::enums::{DependencyKind, EpicStatus};
use gonogo_core::epic::EpicBuilder;
use gonogo_core::id::EntityKind;
use gonogo_store::Storage;
use gonogo_store::traits::{EpicUpdates, Transaction};

use crate::cli::{AdminArgs, AdminCommands};
use crate::context::RuntimeContext;
use crate::output;

pub fn run(ctx: &RuntimeContext, args: &AdminArgs) -> Result<i32> {
    match &args.command {
        AdminCommands::HealthCheck => health_check(ctx),
        AdminCommands::CreateCapability { name, description } => {
            create_capability(ctx, name, description)
        }
        AdminCommands::CreateEpic {
            title,
            capability,
            points_value_cents,
            points_cost_cents,
        } => create_epic(
            ctx,
            title,
            capability.as_deref(),
            *points_value_cents,
            *points_cost_cents,
        ),
        AdminCommands::SetStatus {
            epic_id,
            status,
            force,
        } => set_status(ctx, epic_id, status, *force),
        AdminCommands::DepAdd {
            from,
            to,
            kind,
            rationale,
        } => dep_add(ctx, from, to, kind, rationale),
        AdminCommands::DepRemove { from, to, kind } => dep_remove(ctx, from, to, kind),
        AdminCommands::Events { entity_id } => events(ctx, entity_id),
    }
}

fn health_check(ctx: &RuntimeContext) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let version = store.schema_version()?;
    if ctx.json {
        println!(
            "{}",
            serde_json::json!({"healthy": true, "schema_version": version})
        );
    } else if !ctx.quiet {
        println!("store healthy (schema version {version})");
    }
    Ok(0)
}

fn create_capability(ctx: &RuntimeContext, name: &str, description: &str) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let created = std::cell::RefCell::new(String::new());
    store.run_in_transaction(&|tx: &dyn Transaction| {
        let id = tx.allocate_id(EntityKind::Capability)?;
        let mut cap = Capability::new(&id, name);
        cap.description = description.to_string();
        tx.create_capability(&cap, &ctx.actor)?;
        *created.borrow_mut() = id;
        Ok(())
    })?;
    let id = created.into_inner();

    if ctx.json {
        println!("{}", serde_json::json!({"id": id}));
    } else if !ctx.quiet {
        println!("created capability {id}");
    }
    Ok(0)
}

fn create_epic(
    ctx: &RuntimeContext,
    title: &str,
    capability: Option<&str>,
    value_cents: Option<i64>,
    cost_cents: Option<i64>,
) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let created = std::cell::RefCell::new(String::new());
    store.run_in_transaction(&|tx: &dyn Transaction| {
        let id = tx.allocate_id(EntityKind::Epic)?;
        let mut builder = EpicBuilder::new(&id, title);
        if let Some(capability) = capability {
            builder = builder.capability(capability);
        }
        if let (Some(value), Some(cost)) = (value_cents, cost_cents) {
            builder = builder.roi(value, cost);
        }
        tx.create_epic(&builder.build(), &ctx.actor)?;
        *created.borrow_mut() = id;
        Ok(())
    })?;
    let id = created.into_inner();

    if ctx.json {
        println!("{}", serde_json::json!({"id": id}));
    } else if !ctx.quiet {
        println!("created epic {id}");
    }
    Ok(0)
}

fn set_status(ctx: &RuntimeContext, epic_id: &str, status: &str, force: bool) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let status = EpicStatus::from_str(status).map_err(|e| anyhow::anyhow!(e))?;

    let updates = EpicUpdates {
        status: Some(status),
        admin_override: force,
        ..Default::default()
    };
    match store.update_epic(epic_id, &updates, &ctx.actor) {
        Ok(()) => {
            if !ctx.quiet && !ctx.json {
                println!("{epic_id} -> {status}");
            }
            Ok(0)
        }
        Err(e) if e.is_integrity() => {
            eprintln!("rejected: {e} (use --force to override)");
            Ok(1)
        }
        Err(e) => Err(e).context("status update failed"),
    }
}

fn dep_add(
    ctx: &RuntimeContext,
    from: &str,
    to: &str,
    kind: &str,
    rationale: &str,
) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let kind = DependencyKind::from_str(kind).map_err(|e| anyhow::anyhow!(e))?;
    let dep = EpicDependency {
        from_epic: from.to_string(),
        to_epic: to.to_string(),
        kind,
        rationale: rationale.to_string(),
        created_at: chrono::Utc::now(),
    };
    match store.add_dependency(&dep, &ctx.actor) {
        Ok(()) => {
            if !ctx.quiet && !ctx.json {
                println!("{from} -{kind}-> {to}");
            }
            Ok(0)
        }
        Err(e) if e.is_integrity() => {
            // Cycle insertion: rejected, graph unchanged.
            eprintln!("rejected: {e}");
            Ok(1)
        }
        Err(e) => Err(e).context("dependency insert failed"),
    }
}

fn dep_remove(ctx: &RuntimeContext, from: &str, to: &str, kind: &str) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let kind = DependencyKind::from_str(kind).map_err(|e| anyhow::anyhow!(e))?;
    store.remove_dependency(from, to, kind, &ctx.actor)?;
    if !ctx.quiet && !ctx.json {
        println!("removed {from} -{kind}-> {to}");
    }
    Ok(0)
}

fn events(ctx: &RuntimeContext, entity_id: &str) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let events = store.list_events(entity_id)?;
    if ctx.json {
        let rows: Vec<serde_json::Value> = events
            .iter()
            .map(|e| {
                serde_json::json!({
                    "event_type": e.event_type.as_str(),
                    "actor": e.actor,
                    "old_value": e.old_value,
                    "new_value": e.new_value,
                    "comment": e.comment,
                    "created_at": e.created_at.to_rfc3339(),
                })
            })
            .collect();
        output::print_json(&rows)?;
    } else {
        for event in &events {
            println!(
                "{} {} by {}{}",
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.event_type,
                event.actor,
                match (&event.old_value, &event.new_value) {
                    (Some(old), Some(new)) => format!(" ({old} -> {new})"),
                    (None, Some(new)) => format!(" ({new})"),
                    _ => String::new(),
                }
            );
        }
    }
    Ok(0)
}
