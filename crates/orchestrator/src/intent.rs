//! Best-effort intent parsing for chat turns.
//!
//! This is a heuristic, not a command grammar: a phrase like
//! "create a file naming convention" matches and yields `naming`.
//! Callers treat the result as a hint and fall back to updating the
//! selected file when it is wrong or absent.

use regex::Regex;
use std::sync::LazyLock;

static CREATE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)create?\s+(?:a\s+)?(?:new\s+)?file\s+(?:called\s+|named\s+)?(\S+)")
        .expect("static regex")
});

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)\n```").expect("static regex"));

/// File name the user asked to create, if the message reads like a
/// create-file request.
pub fn requested_file_name(input: &str) -> Option<&str> {
    CREATE_FILE
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// First fenced code block in a model reply, or the whole reply when
/// there is no fence.
pub fn extract_code(reply: &str) -> &str {
    CODE_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
}

/// Starter content for a manually created file, keyed on extension.
pub fn starter_content(file_name: &str) -> String {
    if let Some(stem) = file_name.strip_suffix(".tsx") {
        return format!(
            "import React from 'react';\n\n\
             interface {stem}Props {{\n  // Define your props here\n}}\n\n\
             const {stem}: React.FC<{stem}Props> = () => {{\n\
             \x20 return (\n    <div>\n      <h1>Hello from {stem}</h1>\n    </div>\n  );\n\
             }};\n\n\
             export default {stem};\n"
        );
    }
    if file_name.ends_with(".css") {
        return format!(
            "/* Styles for {file_name} */\n\n\
             .container {{\n\
             \x20 max-width: 1200px;\n\
             \x20 margin: 0 auto;\n\
             \x20 padding: 0 1rem;\n\
             }}\n"
        );
    }
    if file_name.ends_with(".html") {
        return format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n\
             \x20   <meta charset=\"UTF-8\">\n\
             \x20   <title>{file_name}</title>\n\
             </head>\n<body>\n</body>\n</html>\n"
        );
    }
    String::new()
}
