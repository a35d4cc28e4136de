use serde_json::json;

use super::{CommandError, Context};

pub(crate) async fn cmd_reconcile(ctx: &Context, dry_run: bool) -> Result<(), CommandError> {
    let report = ctx.workflow.reconciler().sweep(dry_run).await?;
    ctx.emit(
        || {
            let mut lines = vec![format!(
                "scanned {} confirmed plans, {} missing orders, {} repaired, {} failed",
                report.scanned,
                report.missing.len(),
                report.repaired.len(),
                report.failures.len()
            )];
            for path in &report.missing {
                let state = if report.repaired.contains(path) {
                    "repaired"
                } else if dry_run {
                    "missing"
                } else {
                    "failed"
                };
                lines.push(format!("  {} {}", state, path));
            }
            lines.join("\n")
        },
        json!({ "dryRun": dry_run, "report": report }),
    );
    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Message(format!(
            "{} plans could not be reconciled",
            report.failures.len()
        )))
    }
}
