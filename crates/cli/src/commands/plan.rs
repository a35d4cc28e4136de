use ooh_storage::DocumentStore;
use ooh_workflow::DerivationOutcome;
use serde_json::json;

use super::{CommandError, Context};

pub(crate) async fn cmd_convert_plan(ctx: &Context, id: &str) -> Result<(), CommandError> {
    let campaign = ctx.workflow.convert_plan(id).await?;
    ctx.emit(
        || format!("plan {} converted to {}", id, campaign),
        json!({ "plan": id, "campaign": campaign.path() }),
    );
    Ok(())
}

/// Commit a status change, then run the watcher over the resulting events so
/// derivations happen in this process.
pub(crate) async fn cmd_set_status(
    ctx: &Context,
    collection: &str,
    id: &str,
    status: &str,
) -> Result<(), CommandError> {
    let mut feed = ctx.workflow.store().subscribe();
    let path = ctx.workflow.set_status(collection, id, status).await?.path;

    let report = ctx.workflow.watcher().drain(&mut feed).await;
    let derived: Vec<_> = report
        .dispatched
        .iter()
        .filter_map(|d| match &d.outcome {
            DerivationOutcome::Derived { outputs, .. } => Some(json!({
                "job": d.job,
                "source": d.source.path(),
                "outputs": outputs.iter().map(|o| o.path()).collect::<Vec<_>>(),
            })),
            DerivationOutcome::AlreadyDerived { .. } => None,
        })
        .collect();
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|(event_id, e)| {
            json!({ "eventId": event_id, "kind": e.kind().as_str(), "error": e.to_string() })
        })
        .collect();

    ctx.emit(
        || {
            let mut lines = vec![format!("{} status set to {}", path, status)];
            for d in &report.dispatched {
                if let DerivationOutcome::Derived { outputs, .. } = &d.outcome {
                    let outputs: Vec<String> = outputs.iter().map(|o| o.path()).collect();
                    lines.push(format!("  {}: created {}", d.job, outputs.join(", ")));
                }
            }
            lines.join("\n")
        },
        json!({
            "path": path.path(),
            "status": status,
            "derived": derived,
            "failures": failures,
        }),
    );

    match report.failures.into_iter().next() {
        Some((_, e)) => Err(e.into()),
        None => Ok(()),
    }
}
