use std::path::Path;

use ooh_storage::{DocumentRef, DocumentStore, Patch, SetMode};
use serde_json::{json, Value};

use super::{CommandError, Context};

/// Write every document of a seed file: `{ "<collection>": { "<id>": {..} } }`.
/// Existing documents are replaced. No derivations run.
pub(crate) async fn cmd_seed(ctx: &Context, file: &Path) -> Result<(), CommandError> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| format!("error reading file '{}': {}", file.display(), e))?;
    let seed: Value = serde_json::from_str(&contents)
        .map_err(|e| format!("error parsing JSON in '{}': {}", file.display(), e))?;
    let collections = seed
        .as_object()
        .ok_or_else(|| format!("seed file '{}' must be a JSON object", file.display()))?;

    let store = ctx.workflow.store();
    let mut written = 0usize;
    for (collection, documents) in collections {
        let documents = documents.as_object().ok_or_else(|| {
            format!("seed collection '{}' must map ids to documents", collection)
        })?;
        for (id, fields) in documents {
            let path = DocumentRef::parse(&format!("{}/{}", collection, id))
                .ok_or_else(|| format!("invalid document path '{}/{}'", collection, id))?;
            let fields = fields
                .as_object()
                .ok_or_else(|| format!("document '{}' must be a JSON object", path))?;
            store
                .set(&path, Patch::from(fields.clone()), SetMode::Replace)
                .await?;
            written += 1;
        }
    }

    tracing::info!(documents = written, file = %file.display(), "seed applied");
    ctx.emit(
        || format!("seeded {} documents", written),
        json!({ "seeded": written }),
    );
    Ok(())
}
