/// System message sent alongside the prompt to chat-style backends.
pub const SYSTEM_PROMPT: &str = "You specialize in Java/JVM/JFR diagnostics.";

const PREAMBLE: &str = "You are an expert JVM performance and diagnostics assistant. \
Review the following summary of Java Flight Recorder (JFR) data, \
and list any potential issues, root causes, and actionable recommendations. \
Explain your conclusions clearly for a JVM/application engineer.";

const CLOSING_QUESTION: &str =
    "What are the JVM performance or stability risks and what should the user look at first?";

pub fn build_prompt(summary_text: &str) -> String {
    format!("{PREAMBLE}\n\n{summary_text}\n\n{CLOSING_QUESTION}")
}
