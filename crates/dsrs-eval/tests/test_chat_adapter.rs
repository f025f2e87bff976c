use dsrs_eval::{
    ChatAdapter, LmUsage, ParseError, Role, Signature, example, parse_sections,
};
use rstest::*;

#[fixture]
fn signature() -> Signature {
    Signature::new("Classify the support ticket.")
        .input("ticket", "Ticket text in French")
        .output("category", "One of the support categories")
        .output("priority", "")
}

#[rstest]
fn system_message_describes_fields_and_task(signature: Signature) {
    let system = ChatAdapter.build_system(&signature);

    assert!(system.starts_with("Your input fields are:\n1. `ticket`: Ticket text in French\n"));
    assert!(system.contains("Your output fields are:\n1. `category`: One of the support categories\n2. `priority`\n"));
    assert!(system.contains("[[ ## ticket ## ]]\n{ticket}\n\n[[ ## category ## ]]"));
    assert!(system.contains("[[ ## completed ## ]]"));
    assert!(system.ends_with(
        "In adhering to this structure, your objective is: \n        Classify the support ticket."
    ));
}

#[rstest]
fn missing_instruction_falls_back_to_field_summary() {
    let signature: Signature = "question -> answer".parse().expect("valid signature");
    let system = ChatAdapter.build_system(&signature);
    assert!(system.contains("Given the fields `question`, produce the fields `answer`."));
}

#[rstest]
fn demos_become_user_assistant_pairs(signature: Signature) {
    let demo = example! {
        "ticket": "input" => "Écran noir",
        "category": "output" => "Hardware",
        "priority": "output" => "High",
    };
    let inputs = example! { "ticket": "input" => "Wifi lent" };

    let chat = ChatAdapter.format(&signature, &[demo], &inputs);

    let roles: Vec<Role> = chat.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(chat.messages[1].content.starts_with("[[ ## ticket ## ]]\nÉcran noir\n\n"));
    assert_eq!(
        chat.messages[2].content,
        "[[ ## category ## ]]\nHardware\n\n[[ ## priority ## ]]\nHigh\n\n[[ ## completed ## ]]"
    );
    let last = chat.last().expect("final user message");
    assert!(last.content.contains("Wifi lent"));
    assert!(last.content.ends_with(
        "starting with the field `[[ ## category ## ]]`, then `[[ ## priority ## ]]`, and then ending with the marker for `[[ ## completed ## ]]`."
    ));
}

#[rstest]
fn parses_declared_sections(signature: Signature) {
    let response = "Sure!\n[[ ## category ## ]]\nNetwork\n\n[[ ## priority ## ]]\nHigh\n\n[[ ## completed ## ]]";

    let prediction = ChatAdapter
        .parse_response(&signature, response, LmUsage::new(12, 4))
        .expect("all fields present");

    assert_eq!(prediction.get("category"), Some("Network"));
    assert_eq!(prediction.get("priority"), Some("High"));
    assert_eq!(prediction.lm_usage.total_tokens, 16);
    assert_eq!(prediction.keys(), vec!["category", "priority"]);
}

#[rstest]
fn header_with_inline_value_and_repeats() {
    let sections = parse_sections(
        "[[ ## category ## ]] Email\n[[ ## category ## ]]\nHardware\n[[ ## notes ## ]]\nline one\nline two",
    );
    assert_eq!(sections["category"], "Email");
    assert_eq!(sections["notes"], "line one\nline two");
}

#[rstest]
fn one_missing_field_is_reported_by_name(signature: Signature) {
    let err = ChatAdapter
        .parse_response(&signature, "[[ ## category ## ]]\nNetwork", LmUsage::default())
        .expect_err("priority is missing");

    assert_eq!(err.field(), Some("priority"));
    assert!(matches!(err, ParseError::MissingField { .. }));
}

#[rstest]
fn several_missing_fields_are_grouped(signature: Signature) {
    let err = ChatAdapter
        .parse_response(&signature, "no structure at all", LmUsage::default())
        .expect_err("nothing parsed");

    match err {
        ParseError::Multiple { ref errors } => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case("")]
#[case("   \n  ")]
fn blank_response_is_empty(signature: Signature, #[case] response: &str) {
    let err = ChatAdapter
        .parse_response(&signature, response, LmUsage::default())
        .expect_err("blank response");
    assert!(matches!(err, ParseError::EmptyResponse));
}
