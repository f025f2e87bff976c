use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, trace};

use crate::{Chat, Example, Field, LmUsage, Message, ParseError, Prediction, Signature};

/// Builds prompts and parses responses using the `[[ ## field ## ]]` delimiter protocol.
///
/// The system message describes the fields, shows the expected structure and
/// states the task. Each demo becomes a user/assistant pair, and the final user
/// message carries the input fields and the response instructions.
#[derive(Default, Clone, Copy, Debug)]
pub struct ChatAdapter;

static FIELD_HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\[ ## ([^#]+?) ## \]\]").expect("static header pattern"));

impl ChatAdapter {
    #[tracing::instrument(
        name = "dsrs.adapter.chat.format",
        level = "trace",
        skip(self, signature, demos, inputs),
        fields(demos = demos.len())
    )]
    pub fn format(&self, signature: &Signature, demos: &[Example], inputs: &Example) -> Chat {
        let mut chat = Chat::new(vec![Message::system(self.build_system(signature))]);

        for demo in demos {
            chat.push_message(Message::user(self.format_user_message(signature, demo)));
            chat.push_message(Message::assistant(self.format_assistant_message(signature, demo)));
        }
        chat.push_message(Message::user(self.format_user_message(signature, inputs)));

        trace!(messages = chat.len(), "formatted chat");
        chat
    }

    pub fn build_system(&self, signature: &Signature) -> String {
        [
            self.format_field_description(signature),
            self.format_field_structure(signature),
            self.format_task_description(signature),
        ]
        .join("\n\n")
    }

    fn format_field_description(&self, signature: &Signature) -> String {
        format!(
            "Your input fields are:\n{}\nYour output fields are:\n{}",
            field_attribute_list(&signature.input_fields),
            field_attribute_list(&signature.output_fields)
        )
    }

    fn format_field_structure(&self, signature: &Signature) -> String {
        let mut structure = String::from(
            "All interactions will be structured in the following way, with the appropriate values filled in.\n\n",
        );
        for field_name in signature
            .input_fields
            .keys()
            .chain(signature.output_fields.keys())
        {
            structure.push_str(&format!("[[ ## {field_name} ## ]]\n{{{field_name}}}\n\n"));
        }
        structure.push_str("[[ ## completed ## ]]");
        structure
    }

    fn format_task_description(&self, signature: &Signature) -> String {
        let instruction = if signature.instruction.is_empty() {
            format!(
                "Given the fields {}, produce the fields {}.",
                backticked(signature.input_fields.keys()),
                backticked(signature.output_fields.keys())
            )
        } else {
            signature.instruction.clone()
        };

        let indented = instruction
            .lines()
            .map(|line| format!("        {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("In adhering to this structure, your objective is: \n{indented}")
    }

    fn format_response_instructions(&self, signature: &Signature) -> String {
        let mut fields = signature.output_fields.keys();
        let Some(first) = fields.next() else {
            return "Respond with the marker for `[[ ## completed ## ]]`.".to_string();
        };

        let mut message = format!(
            "Respond with the corresponding output fields, starting with the field `[[ ## {first} ## ]]`,"
        );
        for field in fields {
            message.push_str(&format!(" then `[[ ## {field} ## ]]`,"));
        }
        message.push_str(" and then ending with the marker for `[[ ## completed ## ]]`.");
        message
    }

    pub fn format_user_message(&self, signature: &Signature, inputs: &Example) -> String {
        let mut message = String::new();
        for field_name in signature.input_fields.keys() {
            let value = inputs.get(field_name).unwrap_or_default();
            message.push_str(&format!("[[ ## {field_name} ## ]]\n{value}\n\n"));
        }
        message.push_str(&self.format_response_instructions(signature));
        message
    }

    /// Renders a demo's output fields the way a well-formed answer looks.
    pub fn format_assistant_message(&self, signature: &Signature, demo: &Example) -> String {
        let mut message = String::new();
        for field_name in signature.output_fields.keys() {
            if let Some(value) = demo.get(field_name) {
                message.push_str(&format!("[[ ## {field_name} ## ]]\n{value}\n\n"));
            }
        }
        message.push_str("[[ ## completed ## ]]");
        message
    }

    /// Extracts every declared output field from `content`.
    ///
    /// Fails with [`ParseError::MissingField`] for the first declared field
    /// without a section; a single missing field is reported directly, several
    /// as [`ParseError::Multiple`].
    pub fn parse_response(
        &self,
        signature: &Signature,
        content: &str,
        lm_usage: LmUsage,
    ) -> Result<Prediction, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::EmptyResponse);
        }

        let mut sections = parse_sections(content);
        let mut data = IndexMap::new();
        let mut errors = Vec::new();
        for field_name in signature.output_fields.keys() {
            match sections.shift_remove(field_name) {
                Some(value) => {
                    data.insert(field_name.clone(), value);
                }
                None => errors.push(ParseError::MissingField {
                    field: field_name.clone(),
                    raw_response: content.to_string(),
                }),
            }
        }

        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(ParseError::Multiple { errors }),
        }

        let extra: Vec<_> = sections
            .keys()
            .filter(|name| name.as_str() != "completed")
            .collect();
        if !extra.is_empty() {
            debug!(?extra, "ignoring undeclared sections in response");
        }

        Prediction::try_new(data, &signature.output_names(), lm_usage)
    }

    /// Declared outputs that do have a section in `content`, in signature
    /// order. Missing ones are simply absent.
    pub fn parse_partial(
        &self,
        signature: &Signature,
        content: &str,
        lm_usage: LmUsage,
    ) -> Prediction {
        let mut sections = parse_sections(content);
        let data = signature
            .output_fields
            .keys()
            .filter_map(|name| Some((name.clone(), sections.shift_remove(name)?)))
            .collect();
        Prediction::new(data, lm_usage)
    }
}

fn field_attribute_list(fields: &IndexMap<String, Field>) -> String {
    let mut list = String::new();
    for (i, (field_name, field)) in fields.iter().enumerate() {
        list.push_str(&format!("{}. `{field_name}`", i + 1));
        if !field.desc.is_empty() {
            list.push_str(&format!(": {}", field.desc));
        }
        list.push('\n');
    }
    list
}

fn backticked<'a>(names: impl Iterator<Item = &'a String>) -> String {
    names
        .map(|name| format!("`{name}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits a response into `[[ ## name ## ]]` sections. Text before the first
/// header is dropped; a repeated header keeps its first occurrence.
pub fn parse_sections(content: &str) -> IndexMap<String, String> {
    let mut parsed = IndexMap::new();
    let mut open: Option<(&str, Vec<&str>)> = None;

    for line in content.lines() {
        let stripped = line.trim();
        let header = FIELD_HEADER_PATTERN
            .captures(stripped)
            .and_then(|caps| Some((caps.get(0)?.end(), caps.get(1)?.as_str().trim())));

        match header {
            Some((end, name)) => {
                close_section(&mut parsed, open.take());
                let inline = stripped[end..].trim();
                let body = if inline.is_empty() { vec![] } else { vec![inline] };
                open = Some((name, body));
            }
            None => {
                if let Some((_, body)) = open.as_mut() {
                    body.push(line);
                }
            }
        }
    }
    close_section(&mut parsed, open);
    parsed
}

fn close_section(parsed: &mut IndexMap<String, String>, section: Option<(&str, Vec<&str>)>) {
    if let Some((name, body)) = section {
        parsed
            .entry(name.to_string())
            .or_insert_with(|| body.join("\n").trim().to_string());
    }
}
