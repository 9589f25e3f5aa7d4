//! Builds the single delimited generation request from retrieved chunks,
//! case details and jurisdiction rules.
//!
//! Every block is wrapped in its own XML-style element and all interpolated
//! text is escaped, so chunk text can never close a section early.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::PetitionError;
use crate::rules::{jurisdiction_profile, petition_profile};
use crate::types::{Chunk, GenerationState};

const TEMPLATE_LIMIT: usize = 3;
const CASE_LIMIT: usize = 3;
const CASE_CHARS: usize = 500;
const ARGUMENT_LIMIT: usize = 5;
const ARGUMENT_CHARS: usize = 300;

/// Fields rendered as parties rather than in the generic detail list.
const PARTY_FIELDS: &[&str] = &["petitioner_name", "respondent_name"];

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", s[..i].trim_end()),
        None => s.to_string(),
    }
}

/// `Arguments:` segments from content chunks, one per chunk at most.
fn arguments(chunks: &[Chunk]) -> Vec<String> {
    chunks
        .iter()
        .filter_map(|c| {
            let at = c.text.find("Arguments:")?;
            let rest = c.text[at + "Arguments:".len()..].trim();
            // Segment ends at the next blank line.
            let seg = rest.split("\n\n").next().unwrap_or(rest).trim();
            (!seg.is_empty()).then(|| truncate(seg, ARGUMENT_CHARS))
        })
        .take(ARGUMENT_LIMIT)
        .collect()
}

/// Distinct labels in first-seen order.
fn distinct_labels(chunks: &[Chunk]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for c in chunks {
        let l = c.label.trim();
        if !l.is_empty() && !out.contains(&l) {
            out.push(l);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    min_chars: usize,
}

impl PromptComposer {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Compose the request for `state`. Needs at least one chunk from each index.
    pub fn compose(&self, state: &GenerationState) -> Result<String, PetitionError> {
        let structure = state.structure_chunks();
        let content = state.content_chunks();
        if structure.is_empty() || content.is_empty() {
            return Err(PetitionError::RetrievalInsufficient {
                structure: structure.len(),
                content: content.len(),
            });
        }

        let jp = jurisdiction_profile(state.jurisdiction());
        let pp = petition_profile(state.petition_type());
        let mut p = String::with_capacity(8 * 1024);

        p.push_str("<petition_request>\n");

        // Query context
        p.push_str("<query_context>\n");
        let _ = writeln!(p, "<session_id>{}</session_id>", escape(state.session_id()));
        let _ = writeln!(
            p,
            "<jurisdiction code=\"{}\">{}</jurisdiction>",
            jp.jurisdiction.code(),
            escape(jp.name)
        );
        let _ = writeln!(
            p,
            "<petition_type code=\"{}\">{}</petition_type>",
            pp.petition_type.code(),
            escape(pp.name)
        );
        let _ = writeln!(p, "<user_input>{}</user_input>", escape(state.user_input()));
        p.push_str("</query_context>\n\n");

        // Case details
        p.push_str(&render_case_details(state.case_details()));

        // Structure
        p.push_str("<retrieved_structure>\n<document_templates>\n");
        for c in structure.iter().take(TEMPLATE_LIMIT) {
            let _ = writeln!(
                p,
                "<template section=\"{}\" source=\"{}\" similarity=\"{:.3}\">\n{}\n</template>",
                escape(&c.label),
                escape(&c.source_id),
                c.similarity,
                escape(&c.text)
            );
        }
        p.push_str("</document_templates>\n<section_skeleton>\n");
        for label in distinct_labels(structure) {
            let _ = writeln!(p, "<section>{}</section>", escape(label));
        }
        p.push_str("</section_skeleton>\n</retrieved_structure>\n\n");

        // Content
        p.push_str("<retrieved_content>\n<relevant_cases>\n");
        for c in content.iter().take(CASE_LIMIT) {
            let _ = writeln!(
                p,
                "<case source=\"{}\" jurisdiction=\"{}\" type=\"{}\">\n{}\n</case>",
                escape(&c.source_id),
                c.jurisdiction.code(),
                c.petition_type.code(),
                escape(&truncate(&c.text, CASE_CHARS))
            );
        }
        p.push_str("</relevant_cases>\n<legal_arguments>\n");
        for a in arguments(content) {
            let _ = writeln!(p, "<argument>{}</argument>", escape(&a));
        }
        p.push_str("</legal_arguments>\n<precedents>\n");
        for topic in distinct_labels(content) {
            let _ = writeln!(p, "<precedent>{}</precedent>", escape(topic));
        }
        p.push_str("</precedents>\n</retrieved_content>\n\n");

        // Rules
        p.push_str("<jurisdiction_rules>\n");
        let _ = writeln!(p, "<rule>Use {} formatting style</rule>", jp.formatting);
        let _ = writeln!(p, "<rule>Follow {} document structure</rule>", pp.structure);
        for f in jp.focus.iter().chain(pp.focus.iter()) {
            let _ = writeln!(p, "<rule>Address {}</rule>", f.replace('_', " "));
        }
        p.push_str("</jurisdiction_rules>\n\n");

        // Instructions
        p.push_str("<generation_instructions>\n");
        let _ = writeln!(p, "<required_sections>{}</required_sections>", jp.required_sections.join(", "));
        let headings: Vec<&str> = jp.markers.iter().map(|m| m.name).collect();
        let _ = writeln!(
            p,
            "<instruction>Use these exact section headings, each on its own line in capitals: {}</instruction>",
            headings.join(", ")
        );
        let _ = writeln!(p, "<instruction>Write in {} register</instruction>", pp.language.replace('_', " "));
        let _ = writeln!(
            p,
            "<instruction>Write at least {} characters. Use the parties and facts given; leave no placeholders or blanks</instruction>",
            self.min_chars
        );
        p.push_str("<instruction>Use the retrieved structure for section order and the retrieved content for arguments and precedents</instruction>\n");
        p.push_str("</generation_instructions>\n</petition_request>\n");

        Ok(p)
    }
}

fn render_case_details(details: &BTreeMap<String, String>) -> String {
    let mut p = String::from("<case_details>\n");
    let get = |k: &str| details.get(k).map(String::as_str).unwrap_or("");
    let _ = writeln!(
        p,
        "<parties><petitioner>{}</petitioner><respondent>{}</respondent></parties>",
        escape(get("petitioner_name")),
        escape(get("respondent_name"))
    );
    for (k, v) in details {
        if PARTY_FIELDS.contains(&k.as_str()) {
            continue;
        }
        let _ = writeln!(p, "<field name=\"{}\">{}</field>", escape(k), escape(v));
    }
    p.push_str("</case_details>\n\n");
    p
}
