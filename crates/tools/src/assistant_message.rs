//! Assistant Message Parsing
//!
//! The model writes tool calls inline as XML:
//!
//! ```text
//! Let me look at the file.
//! <read_file>
//! <path>src/main.rs</path>
//! </read_file>
//! ```
//!
//! The parser runs over the accumulated text after every streamed increment,
//! so it must accept incomplete input: an unclosed trailing text or tool block
//! comes back with `partial = true`. Only known tool and parameter names open
//! tags; anything else stays text.

use std::collections::BTreeSet;

use taskloop_core::ToolParams;

use crate::trait_def::ToolSpec;

/// One parsed segment of an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantBlock {
    Text {
        content: String,
        partial: bool,
    },
    ToolUse {
        name: String,
        params: ToolParams,
        partial: bool,
    },
}

impl AssistantBlock {
    pub fn is_partial(&self) -> bool {
        match self {
            Self::Text { partial, .. } | Self::ToolUse { partial, .. } => *partial,
        }
    }
}

/// Tool and parameter names recognised as tags.
#[derive(Debug, Clone, Default)]
pub struct ParseVocabulary {
    tools: BTreeSet<String>,
    params: BTreeSet<String>,
}

impl ParseVocabulary {
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a ToolSpec>) -> Self {
        let mut vocab = Self::default();
        for spec in specs {
            vocab.tools.insert(spec.name.clone());
            for p in &spec.parameters {
                vocab.params.insert(p.name.clone());
            }
        }
        vocab
    }

    fn match_open<'a>(set: &'a BTreeSet<String>, rest: &str) -> Option<&'a str> {
        set.iter()
            .find(|name| {
                rest.len() > name.len() + 1
                    && rest[1..].starts_with(name.as_str())
                    && rest[1 + name.len()..].starts_with('>')
            })
            .map(|s| s.as_str())
    }
}

struct OpenTool {
    name: String,
    params: ToolParams,
    /// (parameter name, byte offset where its value starts)
    param: Option<(String, usize)>,
}

/// Parse the (possibly incomplete) assistant text into ordered blocks.
pub fn parse_assistant_message(text: &str, vocab: &ParseVocabulary) -> Vec<AssistantBlock> {
    let mut blocks = Vec::new();
    let mut text_start = 0;
    let mut tool: Option<OpenTool> = None;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if !rest.starts_with('<') {
            i += rest.chars().next().map(char::len_utf8).unwrap_or(1);
            continue;
        }

        match tool.as_mut() {
            Some(open) => {
                if let Some((param, value_start)) = open.param.as_ref() {
                    let close = format!("</{}>", param);
                    if rest.starts_with(&close) {
                        let value = text[*value_start..i].trim().to_string();
                        open.params.insert(param.clone(), value);
                        open.param = None;
                        i += close.len();
                        continue;
                    }
                } else {
                    let close = format!("</{}>", open.name);
                    if rest.starts_with(&close) {
                        i += close.len();
                        if let Some(done) = tool.take() {
                            blocks.push(AssistantBlock::ToolUse {
                                name: done.name,
                                params: done.params,
                                partial: false,
                            });
                        }
                        text_start = i;
                        continue;
                    }
                    if let Some(param) = ParseVocabulary::match_open(&vocab.params, rest) {
                        let value_start = i + param.len() + 2;
                        open.param = Some((param.to_string(), value_start));
                        i = value_start;
                        continue;
                    }
                }
            }
            None => {
                if let Some(name) = ParseVocabulary::match_open(&vocab.tools, rest) {
                    push_text(&mut blocks, &text[text_start..i], false);
                    tool = Some(OpenTool {
                        name: name.to_string(),
                        params: ToolParams::new(),
                        param: None,
                    });
                    i += name.len() + 2;
                    continue;
                }
            }
        }
        i += 1;
    }

    match tool {
        Some(mut open) => {
            if let Some((param, value_start)) = open.param.take() {
                let value = text[value_start..].trim().to_string();
                open.params.insert(param, value);
            }
            blocks.push(AssistantBlock::ToolUse {
                name: open.name,
                params: open.params,
                partial: true,
            });
        }
        None => push_text(&mut blocks, &text[text_start..], true),
    }

    blocks
}

fn push_text(blocks: &mut Vec<AssistantBlock>, raw: &str, partial: bool) {
    let content = raw.trim();
    if !content.is_empty() {
        blocks.push(AssistantBlock::Text {
            content: content.to_string(),
            partial,
        });
    }
}
