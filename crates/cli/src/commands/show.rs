use ooh_storage::{Document, DocumentRef, DocumentStore};
use serde_json::Value;

use super::{document_json, CommandError, Context};

fn text_line(doc: &Document) -> String {
    format!(
        "{}  v{}  {}",
        doc.path,
        doc.version,
        serde_json::to_string(&doc.fields).unwrap_or_default()
    )
}

/// Print one document, or every document of a collection.
pub(crate) async fn cmd_show(
    ctx: &Context,
    collection: &str,
    id: Option<&str>,
) -> Result<(), CommandError> {
    let store = ctx.workflow.store();
    match id {
        Some(id) => {
            let path = DocumentRef::new(collection, id);
            let doc = store.get(&path).await?;
            ctx.emit(
                || {
                    format!(
                        "{} (v{}, updated {})\n{}",
                        doc.path,
                        doc.version,
                        doc.update_time,
                        serde_json::to_string_pretty(&doc.fields).unwrap_or_default()
                    )
                },
                document_json(&doc),
            );
        }
        None => {
            let docs = store.list(collection, None).await?;
            ctx.emit(
                || {
                    if docs.is_empty() {
                        format!("no documents in {}", collection)
                    } else {
                        docs.iter().map(text_line).collect::<Vec<_>>().join("\n")
                    }
                },
                Value::Array(docs.iter().map(document_json).collect()),
            );
        }
    }
    Ok(())
}
