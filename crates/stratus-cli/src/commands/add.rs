use std::path::Path;

use stratus_core::util::normalize_text_option;
use stratus_core::Note;

use crate::commands::common::{normalize_content, open_store};
use crate::error::CliError;

/// Save a note built from the command-line words, printing its id.
pub async fn run_add(
    title: Option<String>,
    content_parts: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let content = normalize_content(&content_parts.join(" ")).ok_or(CliError::EmptyContent)?;
    let title = normalize_text_option(title).unwrap_or_default();

    let store = open_store(db_path).await?;
    let note = Note::new(title, content);
    store.save_note(&note).await?;

    println!("{}", note.id);
    Ok(())
}
