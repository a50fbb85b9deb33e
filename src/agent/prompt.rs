//! System prompt templates for the agent.

use crate::tools::ToolSpec;

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(tools: &[ToolSpec]) -> String {
    let tool_descriptions = if tools.is_empty() {
        "(no tools are available; answer directly)".to_string()
    } else {
        tools
            .iter()
            .map(|t| format!("- **{}**: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a helpful assistant that can call tools to answer questions.

## Tools

{tool_descriptions}

## Rules

1. **Use tools for facts you cannot know** - Call a tool when the answer depends on live data or on a computation you should not do in your head.

2. **Compute with code** - For arithmetic or data manipulation, call run_code with a short script that prints the result. Only printed output is returned to you.

3. **Code runs in a locked-down sandbox** - No filesystem, no module loading, no process access, no eval. Code that tries any of these is refused with "Potentially dangerous code detected"; rewrite it without them.

4. **Read tool errors** - A result starting with "Error:" means the call failed. Fix the arguments or try another approach instead of repeating the same call.

5. **Stop when you know the answer** - Reply with plain text once you have what you need. Keep the answer short and state the result directly."#,
        tool_descriptions = tool_descriptions
    )
}
