/// System prompt sent alongside every petition request, whichever backend serves it.
pub const SYSTEM_PROMPT: &str = "You are an experienced Indian litigation lawyer drafting court petitions. \
Follow the section structure and formatting rules given in the request exactly. \
Write every required section under its own heading in capital letters. \
Use only the facts, parties and authorities supplied; do not invent case citations. \
Never leave placeholders, blanks or bracketed notes in the document.";

/// The request body text for a backend: the composed petition request as-is,
/// with trailing whitespace normalised so retries differ only in their
/// corrective block.
pub fn build_instruction(prompt: &str) -> String {
    let mut s = prompt.trim_end().to_string();
    s.push('\n');
    s
}
