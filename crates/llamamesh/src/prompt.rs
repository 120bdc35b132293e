//! Llama 3 chat template rendering for mesh generation prompts.
use shared::llm::ChatRole;

pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
pub const START_HEADER: &str = "<|start_header_id|>";
pub const END_HEADER: &str = "<|end_header_id|>";
pub const END_OF_TURN: &str = "<|eot_id|>";

/// Asks the model to pick up where the previous assistant turn stopped.
const CONTINUE_MESSAGE: &str = "Continue";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    /// Fresh conversation.
    Begin { system_prompt: String },
    /// Follow-up turn seeded with everything the model produced so far.
    Continue {
        system_prompt: String,
        raw_output: String,
    },
}

fn role_header(role: ChatRole) -> String {
    format!("{START_HEADER}{role}{END_HEADER}")
}

fn format_system_prompt(system_prompt: &str) -> String {
    format!(
        "{BEGIN_OF_TEXT}{}\n{}{END_OF_TURN}{}",
        role_header(ChatRole::System),
        system_prompt.trim(),
        role_header(ChatRole::Assistant),
    )
    .trim()
    .to_string()
}

/// User turn asking to continue, followed by an open assistant turn.
fn continuation_suffix() -> String {
    format!(
        "{}{CONTINUE_MESSAGE}{END_OF_TURN}{}",
        role_header(ChatRole::User),
        role_header(ChatRole::Assistant),
    )
}

fn format_continuation(system_prompt: &str, raw_output: &str) -> String {
    let mut previous_turn = raw_output.trim().to_string();
    if !previous_turn.ends_with(END_OF_TURN) {
        previous_turn.push_str(END_OF_TURN);
    }

    format!(
        "{}{previous_turn}{}",
        format_system_prompt(system_prompt),
        continuation_suffix()
    )
    .trim()
    .to_string()
}

impl Prompt {
    pub fn begin(system_prompt: impl Into<String>) -> Self {
        Prompt::Begin {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn continuation(system_prompt: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Prompt::Continue {
            system_prompt: system_prompt.into(),
            raw_output: raw_output.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        match self {
            Prompt::Begin { system_prompt } | Prompt::Continue { system_prompt, .. } => {
                system_prompt
            }
        }
    }

    /// The full conversation rendered with the model's chat template.
    pub fn formatted(&self) -> String {
        match self {
            Prompt::Begin { system_prompt } => format_system_prompt(system_prompt),
            Prompt::Continue {
                system_prompt,
                raw_output,
            } => format_continuation(system_prompt, raw_output),
        }
    }

    /// Text to feed a model that kept its context from the previous turn.
    /// Only the continuation request is new in that case.
    pub fn session_input(&self) -> String {
        match self {
            Prompt::Begin { .. } => self.formatted(),
            Prompt::Continue { .. } => continuation_suffix(),
        }
    }

    /// Whether the model context should be reset before this prompt.
    pub fn starts_fresh_context(&self) -> bool {
        matches!(self, Prompt::Begin { .. })
    }
}

#[cfg(test)]
mod test {
    use super::{Prompt, END_OF_TURN};

    const SUFFIX: &str = "<|start_header_id|>user<|end_header_id|>Continue<|eot_id|><|start_header_id|>assistant<|end_header_id|>";

    #[test]
    fn test_begin_template() {
        let prompt = Prompt::begin("Create a 3D model of a table.");
        assert_eq!(
            prompt.formatted(),
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\nCreate a 3D model of a table.<|eot_id|><|start_header_id|>assistant<|end_header_id|>"
        );
    }

    #[test]
    fn test_begin_markers_appear_once() {
        let formatted = Prompt::begin("  a chair \n").formatted();
        for marker in [
            "<|start_header_id|>system<|end_header_id|>",
            "<|start_header_id|>assistant<|end_header_id|>",
            "<|begin_of_text|>",
        ] {
            assert_eq!(formatted.matches(marker).count(), 1, "{marker}");
        }

        let (_, body) = formatted
            .split_once("system<|end_header_id|>\n")
            .expect("missing system header");
        let (content, _) = body.split_once(END_OF_TURN).expect("missing eot");
        assert_eq!(content, "a chair");
    }

    #[test]
    fn test_empty_system_prompt() {
        let formatted = Prompt::begin("").formatted();
        assert_eq!(
            formatted,
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n<|eot_id|><|start_header_id|>assistant<|end_header_id|>"
        );
    }

    #[test]
    fn test_continue_appends_eot() {
        let begin = Prompt::begin("a cube").formatted();
        let prompt = Prompt::continuation("a cube", "  ```obj\nv 0 0 0\n ");
        assert_eq!(
            prompt.formatted(),
            format!("{begin}```obj\nv 0 0 0<|eot_id|>{SUFFIX}")
        );
    }

    #[test]
    fn test_continue_keeps_existing_eot() {
        let begin = Prompt::begin("a cube").formatted();
        let prompt = Prompt::continuation("a cube", "v 1 1 1<|eot_id|>\n");
        let formatted = prompt.formatted();
        assert_eq!(formatted, format!("{begin}v 1 1 1<|eot_id|>{SUFFIX}"));
        assert!(!formatted.contains("<|eot_id|><|eot_id|>"));
        assert_eq!(formatted.trim(), formatted);
    }

    #[test]
    fn test_continue_empty_output() {
        let begin = Prompt::begin("").formatted();
        let prompt = Prompt::continuation("", "");
        assert_eq!(prompt.formatted(), format!("{begin}<|eot_id|>{SUFFIX}"));
    }

    #[test]
    fn test_session_input() {
        let begin = Prompt::begin("a lamp");
        assert!(begin.starts_fresh_context());
        assert_eq!(begin.session_input(), begin.formatted());

        let cont = Prompt::continuation("a lamp", "v 0 0 0");
        assert!(!cont.starts_fresh_context());
        assert_eq!(cont.session_input(), SUFFIX);
        assert_eq!(cont.system_prompt(), "a lamp");
    }
}
