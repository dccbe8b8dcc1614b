use crate::protocol::{BrowserAction, HumanInterventionState, InterventionType, NavigationStep};

fn target(element_id: Option<u32>, coords: Option<crate::protocol::Coordinates>) -> String {
    match (element_id, coords) {
        (Some(id), _) => format!("element #{}", id),
        (None, Some(c)) => format!("({:.0}, {:.0})", c.x, c.y),
        (None, None) => "page".to_string(),
    }
}

/// One-line human summary of a browser action.
pub fn describe_action(action: &BrowserAction) -> String {
    match action {
        BrowserAction::Click(a) => format!("Click {}", target(a.element_id, a.coordinates)),
        BrowserAction::Type(a) => format!(
            "Type \"{}\" into {}",
            a.text.as_deref().unwrap_or_default(),
            target(a.element_id, a.coordinates)
        ),
        BrowserAction::Scroll(a) => match a.direction {
            Some(dir) => format!("Scroll {}", format!("{:?}", dir).to_lowercase()),
            None => "Scroll".to_string(),
        },
        BrowserAction::Navigate(a) => match &a.url {
            Some(url) => format!("Navigate to {}", url),
            None => "Navigate".to_string(),
        },
        BrowserAction::Hover(a) => format!("Hover {}", target(a.element_id, a.coordinates)),
        BrowserAction::Select(a) => format!(
            "Select \"{}\" in {}",
            a.text.as_deref().unwrap_or_default(),
            target(a.element_id, None)
        ),
        BrowserAction::Wait(_) => "Wait".to_string(),
        BrowserAction::Keypress(a) => match &a.key {
            Some(key) => format!("Press {}", key),
            None => "Press key".to_string(),
        },
        BrowserAction::Done(a) => match a.success {
            Some(false) => "Done (unsuccessful)".to_string(),
            _ => "Done".to_string(),
        },
    }
}

pub fn format_step(step: &NavigationStep) -> String {
    let mut output = format!(
        "Step {}: {} [{} tokens, {} ms]",
        step.step_number,
        describe_action(&step.action),
        step.tokens_used.total_tokens,
        step.duration_ms
    );
    if !step.reasoning.is_empty() {
        output.push_str(&format!("\n  {}", step.reasoning));
    }
    if let Some(err) = &step.error {
        output.push_str(&format!("\n  Error: {}", err));
    }
    output
}

/// Reason and instructions are shown verbatim.
pub fn format_intervention(state: &HumanInterventionState) -> String {
    let kind = match state.intervention_type {
        InterventionType::Captcha => "CAPTCHA",
        InterventionType::Verification => "Verification",
        InterventionType::LoginRequired => "Login required",
        InterventionType::ComplexInteraction => "Complex interaction",
        InterventionType::Other => "Intervention",
    };
    let mut output = format!("{}: {}", kind, state.reason);
    if let Some(instructions) = &state.instructions {
        output.push_str(&format!("\n  {}", instructions));
    }
    output
}
