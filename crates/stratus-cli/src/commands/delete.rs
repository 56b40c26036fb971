use std::path::Path;

use crate::commands::common::{normalize_note_identifier, open_store, resolve_note};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = open_store(db_path).await?;
    let note = resolve_note(&normalized_id, &store).await?;

    if !store.delete_note(&note.id).await? {
        return Err(CliError::NoteNotFound(normalized_id));
    }
    println!("{}", note.id);
    Ok(())
}
