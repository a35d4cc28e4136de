use ooh_workflow::Allocation;
use serde_json::json;

use super::{CommandError, Context};

pub(crate) async fn cmd_number_invoice(ctx: &Context, id: &str) -> Result<(), CommandError> {
    let allocation = ctx.workflow.number_invoice(id).await?;
    let assigned = matches!(allocation, Allocation::Assigned { .. });
    ctx.emit(
        || {
            if assigned {
                allocation.code().to_string()
            } else {
                format!("{} (already numbered)", allocation.code())
            }
        },
        json!({
            "invoice": id,
            "invoiceNumber": allocation.code(),
            "number": allocation.number(),
            "assigned": assigned,
        }),
    );
    Ok(())
}
