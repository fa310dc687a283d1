//! Outbound prompt assembly.

use file_patch::FileStore;

/// Built-in system instructions describing the change envelope protocol.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = r#"You are a web development assistant that edits a small project on the user's behalf.

Answer in two parts. First, a short conversational plan in plain prose with no code. Second, the file changes that implement it, wrapped exactly like this:

[CODE_CHANGES]
{"files":[{"operation":"CREATE","path":"src/App.tsx","description":"Root component","content":"..."}]}
[CODE_CHANGES_END]

Rules for the change block:
- It contains a single JSON object with a "files" array and nothing else.
- "operation" is one of CREATE, UPDATE, DELETE.
- CREATE and UPDATE carry the complete new file text in "content", escaped as a JSON string.
- DELETE carries no content.
- Every entry has a short human-readable "description".

When the user attaches an image and wants it in the project, CREATE a file for it (for example public/upload.png) whose content is exactly [USE_UPLOADED_IMAGE]; the studio substitutes the uploaded bytes.

The current project files follow each request. Make targeted edits to them instead of rewriting unrelated code."#;

pub const FILE_SYSTEM_HEADER: &str = "--- CURRENT FILE SYSTEM ---";

/// Prefixes `prompt` with the selected element selectors, if any.
#[must_use]
pub fn apply_selection(prompt: &str, selectors: &[String]) -> String {
    if selectors.is_empty() {
        return prompt.to_string();
    }

    let quoted = selectors
        .iter()
        .map(|selector| format!("`{selector}`"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("For the element(s) with CSS selector(s): {quoted}, please do the following: {prompt}")
}

/// Renders every store record as context appended to the prompt.
#[must_use]
pub fn render_file_context(store: &FileStore) -> String {
    let mut sections = vec![format!("\n\n{FILE_SYSTEM_HEADER}")];
    sections.extend(store.iter().map(|(path, record)| {
        if record.is_binary() {
            format!("\n### `{path}`\n[Binary file: {}]", record.type_tag())
        } else {
            format!(
                "\n### `{path}`\n```{}\n{}\n```",
                record.type_tag(),
                record.content()
            )
        }
    }));
    sections.join("\n")
}

#[must_use]
pub fn outbound_prompt(prompt: &str, store: &FileStore) -> String {
    format!("{prompt}{}", render_file_context(store))
}
