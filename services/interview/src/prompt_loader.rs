use anyhow::{Context, Result};
use interview_core::interviewer::TurnPhase;
use interview_core::prompts::PromptSet;
use std::fs;
use std::path::Path;

/// Builds the prompt set, replacing a built-in template for every `<phase>.md`
/// file found in `dir_path`. A missing directory just means no overrides.
pub fn load_prompts(dir_path: &Path) -> Result<PromptSet> {
    let mut prompts = PromptSet::default();
    if !dir_path.exists() {
        tracing::debug!(
            "No prompts directory at {}, using built-in prompts",
            dir_path.display()
        );
        return Ok(prompts);
    }

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?;

            let Ok(phase) = stem.parse::<TurnPhase>() else {
                tracing::warn!("Ignoring prompt file with unknown phase: {}", path.display());
                continue;
            };

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
            tracing::info!("Using {} prompt from {}", phase.as_str(), path.display());
            prompts.set_template(phase, content);
        }
    }

    Ok(prompts)
}
