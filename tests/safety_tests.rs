use aria_pilot::{
    action::action_model::FailureKind,
    agent::{error::EngineError, operator::ScriptedOperator},
    safety::gate::{BLOCKED_MESSAGE, DESTRUCTIVE_KEYWORDS, GateDecision, SafetyGate, classify, describe_type},
};

// =========================================================================
// Classification
// =========================================================================

#[test]
fn only_exact_keywords_match() {
    assert!(!classify("button Deleting"));
    assert!(!classify("link My orders"));
    assert!(!classify("link Payments"));
    assert!(!classify("button Submitted"));
}

#[test]
fn blocked_error_reads_as_the_blocked_message() {
    let err = EngineError::DestructiveActionBlocked("button Delete Account".into());
    assert_eq!(err.to_string(), BLOCKED_MESSAGE);
    assert_eq!(err.failure_kind(), FailureKind::DestructiveBlocked);
    assert!(!err.is_fatal());
}

#[test]
fn destructive_descriptions_are_flagged() {
    assert!(classify("delete account"));
    assert!(classify("button Delete Account"));
    assert!(classify("link CHECKOUT"));
    assert!(classify("button Buy-now"));
    assert!(classify("button Place order"));
    assert!(classify("button Confirm payment"));
}

#[test]
fn ordinary_descriptions_pass() {
    assert!(!classify("click search"));
    assert!(!classify("button Search"));
    assert!(!classify("link Reorder list"));
    assert!(!classify("button Deleted items"));
    assert!(!classify(""));
}

#[test]
fn classification_is_pure() {
    for description in ["delete account", "click search", "button Submit", "link Home"] {
        let first = classify(description);
        for _ in 0..5 {
            assert_eq!(classify(description), first, "{description}");
        }
    }
}

#[test]
fn every_keyword_triggers_on_its_own() {
    for keyword in DESTRUCTIVE_KEYWORDS {
        assert!(classify(&format!("button {keyword}")), "{keyword}");
        assert!(classify(&keyword.to_uppercase()), "{keyword}");
    }
}

#[test]
fn type_prompt_quotes_text() {
    assert_eq!(
        describe_type("textbox Card number", "4242"),
        "type \"4242\" into textbox Card number"
    );
}

// =========================================================================
// Gate
// =========================================================================

#[tokio::test]
async fn harmless_actions_never_reach_operator() {
    let operator = ScriptedOperator::declining();
    let mut gate = SafetyGate::new();

    let decision = gate.check("button Search", "click button Search", &operator).await;

    assert_eq!(decision, GateDecision::Allow);
    assert!(operator.prompts().is_empty());
    assert_eq!(gate.allowed, 1);
}

#[tokio::test]
async fn declined_destructive_action_is_blocked() {
    let operator = ScriptedOperator::declining();
    let mut gate = SafetyGate::new();

    let decision = gate
        .check("button Delete Account", "click button Delete Account", &operator)
        .await;

    assert_eq!(decision, GateDecision::Blocked);
    assert_eq!(operator.prompts(), vec!["click button Delete Account".to_string()]);
    assert_eq!((gate.blocked, gate.confirmed), (1, 0));
}

#[tokio::test]
async fn approved_destructive_action_is_confirmed() {
    let operator = ScriptedOperator::approving();
    let mut gate = SafetyGate::new();

    let decision = gate.check("button Submit", "click button Submit", &operator).await;

    assert_eq!(decision, GateDecision::Confirmed);
    assert_eq!(gate.confirmed, 1);
}

#[tokio::test]
async fn typed_text_does_not_trigger_the_gate() {
    let operator = ScriptedOperator::declining();
    let mut gate = SafetyGate::new();

    let prompt = describe_type("textbox Display name", "delete everything");
    let decision = gate.check("textbox Display name", &prompt, &operator).await;

    assert_eq!(decision, GateDecision::Allow);
    assert!(operator.prompts().is_empty());
}
